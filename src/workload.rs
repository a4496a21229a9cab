use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use k8s_openapi::api::core::v1::{
    Capabilities, Container, Pod, PodOS, PodSecurityContext, PodSpec, SeccompProfile,
    SecurityContext,
};
use kube::api::ObjectMeta;

use crate::scenario::TestCase;

/// Prints the CPUs the container may run on, then idles.
pub const AFFINITY_COMMAND: &str = "grep Cpus_allowed_list /proc/self/status | cut -f2 && sleep 1d";

pub const DEFAULT_IMAGE: &str = "registry.k8s.io/e2e-test-images/busybox:1.36.1-1";

/// UID the restricted security profile runs containers as.
pub const NON_ROOT_UID: i64 = 1000;

/// Label value tying together the pods of one run.
pub fn correlation_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default()
        .to_string()
}

/// Build the single-container pod for a test case.
///
/// Resources are copied from the test case's descriptor as declared: unset
/// requests or limits stay unset.
pub fn make_pod(namespace: &str, timestamp: &str, test_case: &TestCase, image: &str) -> Pod {
    let resources = test_case
        .resources
        .as_ref()
        .map(|r| r.to_requirements())
        .unwrap_or_default();

    Pod {
        metadata: ObjectMeta {
            name: Some(test_case.name.clone()),
            namespace: Some(namespace.into()),
            labels: Some(BTreeMap::from([("time".into(), timestamp.into())])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            os: Some(PodOS {
                name: "linux".into(),
            }),
            containers: vec![Container {
                name: test_case.name.clone(),
                image: Some(image.into()),
                command: Some(vec!["/bin/sh".into()]),
                args: Some(vec!["-c".into(), AFFINITY_COMMAND.into()]),
                resources: Some(resources),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Tighten a pod to the "restricted" pod security standard so it is
/// admitted into namespaces that enforce it.
///
/// Settings the pod already makes explicitly are kept.
pub fn mixin_restricted_pod_security(mut pod: Pod) -> Pod {
    let Some(spec) = pod.spec.as_mut() else {
        return pod;
    };

    let psc = spec
        .security_context
        .get_or_insert_with(PodSecurityContext::default);
    psc.run_as_non_root.get_or_insert(true);
    psc.run_as_user.get_or_insert(NON_ROOT_UID);
    psc.seccomp_profile.get_or_insert_with(|| SeccompProfile {
        type_: "RuntimeDefault".into(),
        ..Default::default()
    });

    for container in spec
        .init_containers
        .iter_mut()
        .flatten()
        .chain(spec.containers.iter_mut())
    {
        let sc = container
            .security_context
            .get_or_insert_with(SecurityContext::default);
        sc.allow_privilege_escalation.get_or_insert(false);
        sc.capabilities.get_or_insert_with(|| Capabilities {
            drop: Some(vec!["ALL".into()]),
            ..Default::default()
        });
    }
    pod
}
