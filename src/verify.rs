use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cgroup::{CgroupMode, read_cgroup_value};
use crate::exec::{ContainerRef, ExecError, Executor};
use crate::quota::{ExpectedQuota, expected_quota};
use crate::resources::{QuantityParseError, cpu_limit_milli};
use crate::scenario::TestCase;

/// How often, and for how long, to re-check a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Reading the cgroup file failed. Worth retrying.
    #[error("failed to read cgroup {path} in {target} (expected {expected:?}): {source}")]
    Transport {
        target: ContainerRef,
        path: &'static str,
        expected: String,
        source: ExecError,
    },

    /// The file was read but holds a different value. Worth retrying.
    #[error("cgroup value {actual:?} at {path} in {target} not equal to expected {expected:?}")]
    Mismatch {
        target: ContainerRef,
        path: &'static str,
        expected: String,
        actual: String,
    },

    /// The pod under test was not built from this test case. This is a bug
    /// in the scenario wiring, not a cluster problem.
    #[error("pod {target} does not match test case {test_case}: {detail}")]
    ScenarioMismatch {
        target: ContainerRef,
        test_case: String,
        detail: String,
    },

    #[error("pod {pod} has no containers")]
    MissingContainer { pod: String },

    #[error(transparent)]
    Quantity(#[from] QuantityParseError),
}

impl VerifyError {
    /// Exec failures and wrong values can clear up on their own; everything
    /// else will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Mismatch { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("cgroup quota still wrong after {attempts} attempts: {last}")]
    Timeout {
        attempts: u32,
        #[source]
        last: VerifyError,
    },

    #[error("could not read cgroup quota after {attempts} attempts: {last}")]
    Transport {
        attempts: u32,
        #[source]
        last: VerifyError,
    },

    #[error(transparent)]
    Invalid(VerifyError),
}

impl WaitError {
    fn exhausted(attempts: u32, last: VerifyError) -> Self {
        if last.is_transport() {
            Self::Transport { attempts, last }
        } else {
            Self::Timeout { attempts, last }
        }
    }

    pub fn last(&self) -> &VerifyError {
        match self {
            Self::Timeout { last, .. } | Self::Transport { last, .. } => last,
            Self::Invalid(last) => last,
        }
    }
}

fn describe_limit(milli: Option<u64>) -> String {
    match milli {
        Some(milli) => format!("{milli}m"),
        None => "unset".to_string(),
    }
}

/// Check once that a pod's first container carries the CFS quota its test
/// case calls for.
///
/// The pod must have been built from `test_case`; a pod whose container
/// name or CPU limit disagrees with the test case is reported as
/// [`VerifyError::ScenarioMismatch`] rather than checked against the
/// wrong expectation.
pub async fn verify_cfs_quota(
    executor: &Executor,
    pod: &Pod,
    test_case: &TestCase,
    mode: CgroupMode,
    period_us: u64,
) -> Result<ExpectedQuota, VerifyError> {
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let container = pod
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .ok_or(VerifyError::MissingContainer {
            pod: pod_name.clone(),
        })?;
    let target = ContainerRef::new(
        pod.metadata.namespace.clone().unwrap_or_default(),
        pod_name,
        container.name.clone(),
    );

    if container.name != test_case.name {
        return Err(VerifyError::ScenarioMismatch {
            target,
            test_case: test_case.name.clone(),
            detail: format!("container is named {:?}", container.name),
        });
    }
    let pod_limit = cpu_limit_milli(container.resources.as_ref())?;
    let declared_limit = test_case.cpu_limit_milli()?;
    if pod_limit != declared_limit {
        return Err(VerifyError::ScenarioMismatch {
            target,
            test_case: test_case.name.clone(),
            detail: format!(
                "pod CPU limit is {}, test case declares {}",
                describe_limit(pod_limit),
                describe_limit(declared_limit)
            ),
        });
    }

    let expected = expected_quota(pod_limit, period_us, test_case.pin_expected, mode);
    let path = mode.cpu_quota_path();
    info!(
        namespace = %target.namespace,
        pod = %target.pod,
        container = %target.container,
        path,
        expected = %expected,
        "looking for cgroup value"
    );

    let line = read_cgroup_value(executor, &target, path)
        .await
        .map_err(|source| VerifyError::Transport {
            target: target.clone(),
            path,
            expected: expected.to_string(),
            source,
        })?;

    let actual = mode.quota_field(&line);
    if expected != actual {
        return Err(VerifyError::Mismatch {
            target,
            path,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(expected)
}

/// Re-run [`verify_cfs_quota`] until it passes or `policy.timeout` runs out.
///
/// Returns the number of attempts it took and the quota that matched.
/// Failures that cannot clear up end the wait immediately. The last sleep
/// is cut short so the final attempt lands on the deadline, never after
/// it. A first attempt lost to an exec failure is always retried once,
/// even past the deadline.
pub async fn wait_for_cfs_quota(
    executor: &Executor,
    pod: &Pod,
    test_case: &TestCase,
    mode: CgroupMode,
    period_us: u64,
    policy: PollPolicy,
) -> Result<(u32, ExpectedQuota), WaitError> {
    let deadline = Instant::now() + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let error = match verify_cfs_quota(executor, pod, test_case, mode, period_us).await {
            Ok(expected) => {
                debug!(test_case = %test_case.name, %expected, attempts, "cgroup quota matched");
                return Ok((attempts, expected));
            }
            Err(error) if !error.is_retryable() => return Err(WaitError::Invalid(error)),
            Err(error) => error,
        };

        let retry_owed = attempts == 1 && error.is_transport();
        let now = Instant::now();
        if now >= deadline && !retry_owed {
            return Err(WaitError::exhausted(attempts, error));
        }
        let pause = if now >= deadline {
            policy.interval
        } else {
            policy.interval.min(deadline - now)
        };
        warn!(test_case = %test_case.name, attempts, %error, "cgroup quota check failed, retrying");
        tokio::time::sleep(pause).await;
    }
}
