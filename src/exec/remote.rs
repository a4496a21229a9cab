use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::exec::executor::{ContainerRef, ExecError, ExecOutput};

async fn read_all(stream: Option<impl AsyncRead + Unpin>) -> std::io::Result<String> {
    let mut out = String::new();
    if let Some(mut stream) = stream {
        stream.read_to_string(&mut out).await?;
    }
    Ok(out)
}

/// Exec into containers through the API server's websocket exec endpoint.
pub struct KubeExecutor {
    client: Client,
}

impl KubeExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl KubeExecutor {
    pub async fn exec(
        &self,
        target: &ContainerRef,
        command: &[&str],
    ) -> Result<ExecOutput, ExecError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let params = AttachParams::default()
            .container(target.container.as_str())
            .stdin(false)
            .stdout(true)
            .stderr(true);

        debug!(container = %target, ?command, "exec");
        let mut attached = pods.exec(&target.pod, command.to_vec(), &params).await?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();
        let (stdout, stderr, status) = tokio::join!(read_all(stdout), read_all(stderr), async {
            match status {
                Some(status) => status.await,
                None => None,
            }
        });
        let (stdout, stderr) = (stdout?, stderr?);

        attached
            .join()
            .await
            .map_err(|e| ExecError::Internal(anyhow::anyhow!("exec channel closed: {e}")))?;

        // The status frame carries the exit code; anything but Success is a
        // failed command.
        match status {
            Some(status) if status.status.as_deref() != Some("Success") => {
                Err(ExecError::CommandFailed {
                    message: status
                        .message
                        .unwrap_or_else(|| "command exited unsuccessfully".to_string()),
                    stderr,
                })
            }
            _ => Ok(ExecOutput { stdout, stderr }),
        }
    }
}
