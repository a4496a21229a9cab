use tracing::{info, warn};

use crate::exec::{ContainerRef, ExecError, Executor};

/// CFS quota file under cgroup v1, as seen from inside a container.
pub const CGROUP_V1_CPU_QUOTA: &str = "/sys/fs/cgroup/cpu/cpu.cfs_quota_us";

/// CPU bandwidth file under cgroup v2 ("<quota> <period>").
pub const CGROUP_V2_CPU_MAX: &str = "/sys/fs/cgroup/cpu.max";

/// Which cgroup API the node runs. Resolved once per run and passed to
/// every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CgroupMode {
    V1,
    V2,
}

impl CgroupMode {
    pub fn cpu_quota_path(self) -> &'static str {
        match self {
            Self::V1 => CGROUP_V1_CPU_QUOTA,
            Self::V2 => CGROUP_V2_CPU_MAX,
        }
    }

    /// The part of a quota file's first line that holds the quota.
    ///
    /// `cpu.max` reads `max 100000` or `20000 100000`; only the first field
    /// is the quota. `cpu.cfs_quota_us` holds nothing else.
    pub fn quota_field(self, line: &str) -> &str {
        match self {
            Self::V1 => line.trim(),
            Self::V2 => line.split_whitespace().next().unwrap_or(""),
        }
    }
}

impl std::fmt::Display for CgroupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => write!(f, "cgroup v1"),
            Self::V2 => write!(f, "cgroup v2"),
        }
    }
}

/// Read the first line of `path` inside the target container.
///
/// Only exec failures are errors; whatever the file holds is returned
/// as-is for the caller to judge.
pub async fn read_cgroup_value(
    executor: &Executor,
    target: &ContainerRef,
    path: &str,
) -> Result<String, ExecError> {
    let out = executor
        .shell(target, &format!("head -n 1 {path}"))
        .await?;
    Ok(out.stdout.trim_end_matches(['\n', '\r']).to_string())
}

/// Work out which cgroup API the container's node uses by looking for a
/// cgroup2 mount from inside the container.
///
/// A failed probe counts as v1.
pub async fn detect_cgroup_mode(executor: &Executor, target: &ContainerRef) -> CgroupMode {
    let mode = match executor.shell(target, "mount -t cgroup2").await {
        Ok(out) if !out.stdout.trim().is_empty() => CgroupMode::V2,
        Ok(_) => CgroupMode::V1,
        Err(error) => {
            warn!(container = %target, %error, "cgroup2 probe failed, assuming cgroup v1");
            CgroupMode::V1
        }
    };
    info!(container = %target, %mode, "resolved cgroup mode");
    mode
}
