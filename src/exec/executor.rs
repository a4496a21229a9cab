use k8s_openapi::api::core::v1::Pod;

use crate::exec::fake::FakeExecutor;
use crate::exec::remote::KubeExecutor;

/// A container inside a pod (namespace + pod + container).
/// Keeps the three strings from being swapped and gives a single
/// `Display` format for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerRef {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl ContainerRef {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }

    /// The first container of a pod, if the pod has a spec with one.
    pub fn first_container(pod: &Pod) -> Option<Self> {
        let container = pod.spec.as_ref()?.containers.first()?;
        Some(Self::new(
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
            container.name.clone(),
        ))
    }
}

impl std::fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// Captured output of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The API server refused or dropped the exec request.
    #[error("exec request failed: {0}")]
    Transport(#[from] kube::Error),

    /// The exec channel broke while streaming output.
    #[error("exec stream failed: {0}")]
    Stream(#[from] std::io::Error),

    /// The command ran but did not exit successfully.
    #[error("command failed: {message}")]
    CommandFailed { message: String, stderr: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Run commands inside running containers - a real cluster, or a scripted
/// fake for tests.
pub enum Executor {
    Kube(KubeExecutor),
    Fake(FakeExecutor),
}

impl Executor {
    pub async fn exec(
        &self,
        target: &ContainerRef,
        command: &[&str],
    ) -> Result<ExecOutput, ExecError> {
        match self {
            Self::Kube(e) => e.exec(target, command).await,
            Self::Fake(e) => e.exec(target, command).await,
        }
    }

    /// Run `script` through `/bin/sh -c`.
    pub async fn shell(
        &self,
        target: &ContainerRef,
        script: &str,
    ) -> Result<ExecOutput, ExecError> {
        self.exec(target, &["/bin/sh", "-c", script]).await
    }
}
