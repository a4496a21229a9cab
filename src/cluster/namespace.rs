use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use tracing::info;

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "cfsquota";

/// Pod security level enforced on test namespaces. Pods going in need
/// `mixin_restricted_pod_security`.
pub const POD_SECURITY_ENFORCE_LABEL: &str = "pod-security.kubernetes.io/enforce";
pub const POD_SECURITY_LEVEL: &str = "restricted";

/// `{prefix}-{8 hex chars}`, unique per run.
pub fn namespace_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// A throwaway namespace holding one run's pods.
pub struct TestNamespace {
    client: Client,
    name: String,
}

impl TestNamespace {
    pub async fn create(client: Client, prefix: &str) -> kube::Result<Self> {
        let name = namespace_name(prefix);
        let namespaces: Api<Namespace> = Api::all(client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: Some(BTreeMap::from([
                    (MANAGED_BY_LABEL.into(), MANAGED_BY.into()),
                    (POD_SECURITY_ENFORCE_LABEL.into(), POD_SECURITY_LEVEL.into()),
                ])),
                ..Default::default()
            },
            ..Default::default()
        };
        namespaces
            .create(&PostParams::default(), &namespace)
            .await?;
        info!(namespace = %name, "created test namespace");
        Ok(Self { client, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start deleting the namespace. Does not wait for it to finish
    /// terminating.
    pub async fn delete(self) -> kube::Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client);
        namespaces
            .delete(&self.name, &DeleteParams::default())
            .await?;
        info!(namespace = %self.name, "deleted test namespace");
        Ok(())
    }
}
