use std::pin::pin;

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::{error, info, warn};

use crate::cgroup::{CgroupMode, detect_cgroup_mode};
use crate::cluster::namespace::TestNamespace;
use crate::cluster::nodes::{NodeError, pick_ready_schedulable_node, preflight_skip_reason};
use crate::cluster::pods::{PodError, create_pod_and_wait, delete_pod_and_wait};
use crate::config::Config;
use crate::exec::{ContainerRef, Executor};
use crate::quota::ExpectedQuota;
use crate::scenario::{ScenarioError, TestCase, validate_scenarios};
use crate::verify::{PollPolicy, WaitError, wait_for_cfs_quota};
use crate::workload::{correlation_timestamp, make_pod, mixin_restricted_pod_security};

/// Error type for suite failures.
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("failed to create test namespace: {0}")]
    Namespace(#[source] kube::Error),
    #[error(transparent)]
    Pod(#[from] PodError),
    #[error("scenario {name} failed: {source}")]
    Verify { name: String, source: WaitError },
}

/// Result of one passing scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub name: String,
    pub expected: ExpectedQuota,
    pub attempts: u32,
}

#[derive(Debug)]
pub enum SuiteOutcome {
    Passed {
        mode: CgroupMode,
        reports: Vec<ScenarioReport>,
    },
    Skipped {
        reason: String,
    },
    /// The shutdown signal fired. Whatever was created has been cleaned up.
    Interrupted,
}

/// Build every scenario's pod from that same scenario, ready to submit to
/// a namespace enforcing the restricted pod security level.
pub fn build_pods(
    namespace: &str,
    timestamp: &str,
    scenarios: &[TestCase],
    image: &str,
) -> Vec<(TestCase, Pod)> {
    scenarios
        .iter()
        .map(|case| {
            let pod = mixin_restricted_pod_security(make_pod(namespace, timestamp, case, image));
            (case.clone(), pod)
        })
        .collect()
}

/// Verify each running pod against the test case it was built from, in
/// order, stopping at the first failure.
pub async fn verify_all(
    executor: &Executor,
    running: &[(TestCase, Pod)],
    mode: CgroupMode,
    period_us: u64,
    policy: PollPolicy,
) -> Result<Vec<ScenarioReport>, SuiteError> {
    let mut reports = Vec::with_capacity(running.len());
    for (case, pod) in running {
        let (attempts, expected) = wait_for_cfs_quota(executor, pod, case, mode, period_us, policy)
            .await
            .map_err(|source| SuiteError::Verify {
                name: case.name.clone(),
                source,
            })?;
        info!(scenario = %case.name, %expected, attempts, "cfs quota verified");
        reports.push(ScenarioReport {
            name: case.name.clone(),
            expected,
            attempts,
        });
    }
    Ok(reports)
}

/// Create one pod per scenario, check each container's CFS quota, and
/// clean up.
pub struct Suite {
    client: Client,
    executor: Executor,
    config: Config,
    scenarios: Vec<TestCase>,
}

impl Suite {
    pub fn new(
        client: Client,
        executor: Executor,
        config: Config,
        scenarios: Vec<TestCase>,
    ) -> Result<Self, SuiteError> {
        validate_scenarios(&scenarios)?;
        Ok(Self {
            client,
            executor,
            config,
            scenarios,
        })
    }

    /// Run every scenario, stopping early once `shutdown` completes.
    ///
    /// Pods and the namespace are deleted however the run ends, including on
    /// shutdown.
    pub async fn run(
        &self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<SuiteOutcome, SuiteError> {
        let mut shutdown = pin!(shutdown);

        let node = tokio::select! {
            node = pick_ready_schedulable_node(self.client.clone()) => node?,
            _ = &mut shutdown => {
                warn!("interrupted before any test resources were created");
                return Ok(SuiteOutcome::Interrupted);
            }
        };
        if let Some(reason) = preflight_skip_reason(&node) {
            warn!(%reason, "skipping static CPU policy CFS quota checks");
            return Ok(SuiteOutcome::Skipped { reason });
        }

        let namespace = TestNamespace::create(self.client.clone(), &self.config.namespace_prefix)
            .await
            .map_err(SuiteError::Namespace)?;

        let mut created = Vec::new();
        let result = tokio::select! {
            result = self.run_in(namespace.name(), &mut created) => result,
            _ = &mut shutdown => {
                warn!(namespace = namespace.name(), "interrupted, cleaning up");
                Ok(SuiteOutcome::Interrupted)
            }
        };
        if let Err(error) = &result {
            error!(%error, "static CPU policy CFS quota check failed");
        }
        self.cleanup(namespace, &created).await;
        result
    }

    async fn run_in(
        &self,
        namespace: &str,
        created: &mut Vec<String>,
    ) -> Result<SuiteOutcome, SuiteError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let timestamp = correlation_timestamp();

        info!(namespace, count = self.scenarios.len(), "creating pods");
        let mut running = Vec::with_capacity(self.scenarios.len());
        for (case, pod) in build_pods(namespace, &timestamp, &self.scenarios, &self.config.image) {
            created.push(case.name.clone());
            let pod = create_pod_and_wait(&pods, &pod, self.config.pod_start_timeout()).await?;
            running.push((case, pod));
        }

        let probe = running
            .first()
            .and_then(|(_, pod)| ContainerRef::first_container(pod))
            .ok_or(ScenarioError::Empty)?;
        let mode = detect_cgroup_mode(&self.executor, &probe).await;

        info!(namespace, %mode, "verifying pods' cfs quota values");
        let reports = verify_all(
            &self.executor,
            &running,
            mode,
            self.config.quota_period_us,
            self.config.poll_policy(),
        )
        .await?;
        Ok(SuiteOutcome::Passed { mode, reports })
    }

    /// Best effort: failures are logged and do not mask the run's result.
    async fn cleanup(&self, namespace: TestNamespace, created: &[String]) {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace.name());
        for name in created {
            if let Err(error) =
                delete_pod_and_wait(&pods, name, self.config.pod_delete_timeout()).await
            {
                warn!(pod = %name, %error, "failed to delete pod");
            }
        }
        let name = namespace.name().to_string();
        if let Err(error) = namespace.delete().await {
            warn!(namespace = %name, %error, "failed to delete test namespace");
        }
    }
}
