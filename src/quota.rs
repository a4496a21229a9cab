use crate::cgroup::CgroupMode;

/// The kubelet's default CFS period, in microseconds.
pub const QUOTA_PERIOD_US: u64 = 100_000;

/// The smallest quota the kubelet will program, in microseconds.
pub const MIN_QUOTA_US: i64 = 1_000;

/// Raw quota value meaning "no quota enforced".
pub const UNLIMITED: i64 = -1;

/// The cgroup CPU quota a container is expected to carry, rendered the way
/// it reads back from the cgroup filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpectedQuota(String);

impl ExpectedQuota {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExpectedQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ExpectedQuota {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ExpectedQuota {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Convert a milli-CPU limit to CPU time per period, in microseconds.
///
/// Rounds down, then clamps to [`MIN_QUOTA_US`] the way the kubelet does.
/// A zero limit has no quota at all.
pub fn milli_cpu_to_quota(milli_cpu: u64, period_us: u64) -> i64 {
    if milli_cpu == 0 {
        return UNLIMITED;
    }
    let quota = u128::from(milli_cpu) * u128::from(period_us) / 1000;
    i64::try_from(quota).unwrap_or(i64::MAX).max(MIN_QUOTA_US)
}

/// Compute the quota the CPU manager should have programmed for a
/// container.
///
/// Exclusive (pinned) containers and containers without a CPU limit run
/// unbounded, whatever the numeric limit says.
pub fn expected_quota(
    cpu_limit_milli: Option<u64>,
    period_us: u64,
    pin_expected: bool,
    mode: CgroupMode,
) -> ExpectedQuota {
    let raw = match cpu_limit_milli {
        Some(milli) if milli > 0 && !pin_expected => milli_cpu_to_quota(milli, period_us),
        _ => UNLIMITED,
    };
    ExpectedQuota(render(raw, mode))
}

fn render(raw: i64, mode: CgroupMode) -> String {
    match (mode, raw) {
        (CgroupMode::V2, UNLIMITED) => "max".to_string(),
        _ => raw.to_string(),
    }
}
