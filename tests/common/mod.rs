use std::time::Duration;

use k8s_openapi::api::core::v1::{Pod, PodStatus};

use cfsquota::exec::Executor;
use cfsquota::exec::fake::{ExecBehavior, FakeExecutor};
use cfsquota::scenario::TestCase;
use cfsquota::suite::build_pods;
use cfsquota::verify::PollPolicy;
use cfsquota::workload::DEFAULT_IMAGE;

/// Pods for `scenarios` as the API server would return them once running.
pub fn running_pods(scenarios: &[TestCase]) -> Vec<(TestCase, Pod)> {
    build_pods("cfs-quota-removal-test", "1", scenarios, DEFAULT_IMAGE)
        .into_iter()
        .map(|(case, mut pod)| {
            pod.status = Some(PodStatus {
                phase: Some("Running".into()),
                ..Default::default()
            });
            (case, pod)
        })
        .collect()
}

/// An executor that answers each exec with the next line of `outputs`.
pub fn scripted(outputs: &[&str]) -> (FakeExecutor, Executor) {
    let fake = outputs.iter().fold(FakeExecutor::new(), |fake, out| {
        fake.on_next_exec(ExecBehavior::stdout(format!("{out}\n")))
    });
    (fake.clone(), Executor::Fake(fake))
}

pub fn quick_policy() -> PollPolicy {
    PollPolicy::new(Duration::from_secs(1), Duration::from_secs(10))
}
