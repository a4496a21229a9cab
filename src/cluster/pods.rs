use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::{DeleteParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum PodError {
    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("waiting on pod {name} failed: {source}")]
    Wait {
        name: String,
        source: kube::runtime::wait::Error,
    },

    #[error("pod {name} was not {what} within {timeout:?}")]
    Timeout {
        name: String,
        what: &'static str,
        timeout: Duration,
    },

    #[error("pod {name} disappeared while waiting for it to run")]
    Vanished { name: String },

    #[error("pod has no name")]
    Unnamed,
}

/// Create a pod and block until it is running, returning the running pod.
pub async fn create_pod_and_wait(
    pods: &Api<Pod>,
    pod: &Pod,
    timeout: Duration,
) -> Result<Pod, PodError> {
    let name = pod.metadata.name.clone().ok_or(PodError::Unnamed)?;
    pods.create(&PostParams::default(), pod).await?;
    info!(pod = %name, "created pod, waiting for it to run");

    let running = tokio::time::timeout(
        timeout,
        await_condition(pods.clone(), &name, conditions::is_pod_running()),
    )
    .await
    .map_err(|_| PodError::Timeout {
        name: name.clone(),
        what: "running",
        timeout,
    })?
    .map_err(|source| PodError::Wait {
        name: name.clone(),
        source,
    })?;

    let running = running.ok_or_else(|| PodError::Vanished { name: name.clone() })?;
    let node = running.spec.as_ref().and_then(|s| s.node_name.as_deref());
    info!(pod = %name, node, "pod is running");
    Ok(running)
}

/// Delete a pod and block until it is gone.
pub async fn delete_pod_and_wait(
    pods: &Api<Pod>,
    name: &str,
    timeout: Duration,
) -> Result<(), PodError> {
    // Right(status) means the object was removed straight away.
    let Some(deleting) = pods.delete(name, &DeleteParams::default()).await?.left() else {
        info!(pod = name, "deleted pod");
        return Ok(());
    };
    let uid = deleting.metadata.uid.unwrap_or_default();

    tokio::time::timeout(
        timeout,
        await_condition(pods.clone(), name, conditions::is_deleted(&uid)),
    )
    .await
    .map_err(|_| PodError::Timeout {
        name: name.to_string(),
        what: "deleted",
        timeout,
    })?
    .map_err(|source| PodError::Wait {
        name: name.to_string(),
        source,
    })?;

    info!(pod = name, "deleted pod");
    Ok(())
}
