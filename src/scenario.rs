use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::{QuantityParseError, ResourceDescriptor};

/// One workload to create and check.
///
/// The name doubles as the pod name and the container name.
/// `pin_expected` marks workloads that should get exclusive CPUs, and with
/// them no CFS quota, whatever their CPU limit says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceDescriptor>,
    #[serde(default)]
    pub pin_expected: bool,
}

impl TestCase {
    pub fn new(name: impl Into<String>, resources: ResourceDescriptor, pin_expected: bool) -> Self {
        Self {
            name: name.into(),
            resources: Some(resources),
            pin_expected,
        }
    }

    /// The CPU limit in milli-CPU, `None` when no limit is declared.
    pub fn cpu_limit_milli(&self) -> Result<Option<u64>, QuantityParseError> {
        match &self.resources {
            Some(resources) => resources.cpu_limit_milli(),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenarios from {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed scenario file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("no scenarios given")]
    Empty,

    #[error("scenario name {0:?} is not a valid DNS-1123 label")]
    InvalidName(String),

    #[error("scenario name {0:?} is used more than once")]
    DuplicateName(String),

    #[error("scenario {name}: {source}")]
    Quantity {
        name: String,
        source: QuantityParseError,
    },
}

/// The four QoS shapes the static policy treats differently:
/// exclusive guaranteed, shared guaranteed, burstable and best-effort.
pub fn default_scenarios() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "guaranteed-exclusive",
            ResourceDescriptor::default()
                .with_cpu("1", "1")
                .with_memory("100Mi", "100Mi"),
            true,
        ),
        TestCase::new(
            "guaranteed-non-exclusive",
            ResourceDescriptor::default()
                .with_cpu("200m", "200m")
                .with_memory("100Mi", "100Mi"),
            false,
        ),
        TestCase::new(
            "burstable",
            ResourceDescriptor::default()
                .with_cpu("100m", "200m")
                .with_memory("100Mi", "100Mi"),
            false,
        ),
        TestCase::new("best-effort", ResourceDescriptor::default(), false),
    ]
}

fn is_dns1123_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    let edge_ok = |b: Option<&u8>| b.is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    name.len() <= 63
        && edge_ok(bytes.first())
        && edge_ok(bytes.last())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// Check a scenario set can run: at least one case, names usable as pod
/// names and unique, and every declared quantity parseable.
pub fn validate_scenarios(cases: &[TestCase]) -> Result<(), ScenarioError> {
    if cases.is_empty() {
        return Err(ScenarioError::Empty);
    }
    let mut seen = HashSet::new();
    for case in cases {
        if !is_dns1123_label(&case.name) {
            return Err(ScenarioError::InvalidName(case.name.clone()));
        }
        if !seen.insert(case.name.as_str()) {
            return Err(ScenarioError::DuplicateName(case.name.clone()));
        }
        if let Some(resources) = &case.resources {
            resources.validate().map_err(|source| ScenarioError::Quantity {
                name: case.name.clone(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Parse a YAML list of scenarios and validate it.
pub fn parse_scenarios(yaml: &str) -> Result<Vec<TestCase>, ScenarioError> {
    let cases: Vec<TestCase> = serde_yaml::from_str(yaml)?;
    validate_scenarios(&cases)?;
    Ok(cases)
}

pub fn load_scenarios(path: impl AsRef<Path>) -> Result<Vec<TestCase>, ScenarioError> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_scenarios(&yaml)
}
