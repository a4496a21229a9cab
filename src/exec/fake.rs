use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::exec::executor::{ContainerRef, ExecError, ExecOutput};

/// What happens on the next `exec()` call.
#[derive(Debug, Clone)]
pub enum ExecBehavior {
    /// The command succeeds and prints the given stdout.
    Stdout(String),
    /// Prints the given stdout after sleeping for the given duration.
    StdoutAfterDelay(String, Duration),
    /// The command ran and exited non-zero.
    CommandFailed(String),
    /// The exec stream broke (container restarting, connection reset).
    ChannelError(String),
    /// Anything else going wrong.
    InternalError(String),
}

impl ExecBehavior {
    pub fn stdout(out: impl Into<String>) -> Self {
        Self::Stdout(out.into())
    }
}

/// Logged record of an `exec()` call.
#[derive(Debug, Clone)]
pub struct ExecCall {
    pub target: ContainerRef,
    pub command: Vec<String>,
}

#[derive(Debug)]
struct FakeExecutorState {
    behaviors: VecDeque<ExecBehavior>,
    default_behavior: ExecBehavior,
    calls: Vec<ExecCall>,
}

/// A deterministic, in-memory executor for testing.
///
/// Each call to `exec()` pops the next behavior from a queue.
/// When the queue is empty, the configured default applies.
#[derive(Debug, Clone)]
pub struct FakeExecutor {
    state: Arc<Mutex<FakeExecutorState>>,
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeExecutorState {
                behaviors: VecDeque::new(),
                default_behavior: ExecBehavior::Stdout(String::new()),
                calls: Vec::new(),
            })),
        }
    }

    // ── Builder methods ──────────────────────────────────────────────

    pub fn on_next_exec(self, behavior: ExecBehavior) -> Self {
        self.state.lock().unwrap().behaviors.push_back(behavior);
        self
    }

    pub fn with_default(self, behavior: ExecBehavior) -> Self {
        self.state.lock().unwrap().default_behavior = behavior;
        self
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<ExecCall> {
        self.state.lock().unwrap().calls.clone()
    }

    // ── Executor implementation ──────────────────────────────────────

    pub async fn exec(
        &self,
        target: &ContainerRef,
        command: &[&str],
    ) -> Result<ExecOutput, ExecError> {
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(ExecCall {
                target: target.clone(),
                command: command.iter().map(|s| s.to_string()).collect(),
            });
            state
                .behaviors
                .pop_front()
                .unwrap_or_else(|| state.default_behavior.clone())
        };

        match behavior {
            ExecBehavior::Stdout(stdout) => Ok(ExecOutput {
                stdout,
                stderr: String::new(),
            }),
            ExecBehavior::StdoutAfterDelay(stdout, delay) => {
                tokio::time::sleep(delay).await;
                Ok(ExecOutput {
                    stdout,
                    stderr: String::new(),
                })
            }
            ExecBehavior::CommandFailed(message) => Err(ExecError::CommandFailed {
                stderr: message.clone(),
                message,
            }),
            ExecBehavior::ChannelError(message) => Err(ExecError::Stream(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                message,
            ))),
            ExecBehavior::InternalError(message) => {
                Err(ExecError::Internal(anyhow::anyhow!(message)))
            }
        }
    }
}
