use std::time::Duration;

use envconfig::Envconfig;

use crate::verify::PollPolicy;

/// Runtime settings, read from the environment.
#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    /// Test namespaces are named `{prefix}-{random suffix}`.
    #[envconfig(from = "CFS_QUOTA_NAMESPACE_PREFIX", default = "cfs-quota-removal")]
    pub namespace_prefix: String,

    #[envconfig(
        from = "CFS_QUOTA_IMAGE",
        default = "registry.k8s.io/e2e-test-images/busybox:1.36.1-1"
    )]
    pub image: String,

    #[envconfig(from = "CFS_QUOTA_POLL_INTERVAL_SECS", default = "2")]
    pub poll_interval_secs: u64,

    /// Bounds both waiting for a pod to run and waiting for its quota to
    /// match.
    #[envconfig(from = "CFS_QUOTA_POD_START_TIMEOUT_SECS", default = "120")]
    pub pod_start_timeout_secs: u64,

    #[envconfig(from = "CFS_QUOTA_POD_DELETE_TIMEOUT_SECS", default = "300")]
    pub pod_delete_timeout_secs: u64,

    /// Must match the kubelet's `cpuCFSQuotaPeriod`.
    #[envconfig(from = "CFS_QUOTA_PERIOD_US", default = "100000")]
    pub quota_period_us: u64,

    /// YAML file with scenarios to run instead of the built-in four.
    #[envconfig(from = "CFS_QUOTA_SCENARIOS")]
    pub scenarios_file: Option<String>,
}

impl Config {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            self.pod_start_timeout(),
        )
    }

    pub fn pod_start_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_start_timeout_secs)
    }

    pub fn pod_delete_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_delete_timeout_secs)
    }
}
