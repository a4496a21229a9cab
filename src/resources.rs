use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to parse quantity \"{raw}\": {reason}")]
pub struct QuantityParseError {
    raw: String,
    reason: &'static str,
}

impl QuantityParseError {
    fn new(raw: &str, reason: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Requests and limits for a single container, as the quantity strings a
/// manifest would carry ("1", "200m", "100Mi").
///
/// `None` means unset, which is not the same as `"0"`: an unset field is
/// left out of the container spec entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_limit: Option<String>,
}

impl ResourceDescriptor {
    pub fn with_cpu(mut self, request: &str, limit: &str) -> Self {
        self.cpu_request = Some(request.into());
        self.cpu_limit = Some(limit.into());
        self
    }

    pub fn with_memory(mut self, request: &str, limit: &str) -> Self {
        self.mem_request = Some(request.into());
        self.mem_limit = Some(limit.into());
        self
    }

    pub fn with_ephemeral_storage(mut self, request: &str, limit: &str) -> Self {
        self.ephemeral_request = Some(request.into());
        self.ephemeral_limit = Some(limit.into());
        self
    }

    /// Check every present quantity parses to a non-negative amount.
    pub fn validate(&self) -> Result<(), QuantityParseError> {
        for cpu in [&self.cpu_request, &self.cpu_limit].into_iter().flatten() {
            parse_milli_cpu(cpu)?;
        }
        for bytes in [
            &self.mem_request,
            &self.mem_limit,
            &self.ephemeral_request,
            &self.ephemeral_limit,
        ]
        .into_iter()
        .flatten()
        {
            parse_bytes(bytes)?;
        }
        Ok(())
    }

    /// The CPU limit in milli-CPU, `None` when no limit is set.
    pub fn cpu_limit_milli(&self) -> Result<Option<u64>, QuantityParseError> {
        self.cpu_limit.as_deref().map(parse_milli_cpu).transpose()
    }

    /// Render as container resource requirements. Maps that would be empty
    /// are left as `None`.
    pub fn to_requirements(&self) -> ResourceRequirements {
        fn collect(entries: [(&str, &Option<String>); 3]) -> Option<BTreeMap<String, Quantity>> {
            let map: BTreeMap<String, Quantity> = entries
                .into_iter()
                .filter_map(|(key, value)| {
                    value
                        .as_ref()
                        .map(|v| (key.to_string(), Quantity(v.clone())))
                })
                .collect();
            (!map.is_empty()).then_some(map)
        }

        ResourceRequirements {
            limits: collect([
                ("cpu", &self.cpu_limit),
                ("memory", &self.mem_limit),
                ("ephemeral-storage", &self.ephemeral_limit),
            ]),
            requests: collect([
                ("cpu", &self.cpu_request),
                ("memory", &self.mem_request),
                ("ephemeral-storage", &self.ephemeral_request),
            ]),
            ..Default::default()
        }
    }
}

/// Read the CPU limit of a container's resource requirements in milli-CPU.
pub fn cpu_limit_milli(
    requirements: Option<&ResourceRequirements>,
) -> Result<Option<u64>, QuantityParseError> {
    requirements
        .and_then(|r| r.limits.as_ref())
        .and_then(|limits| limits.get("cpu"))
        .map(|q| parse_milli_cpu(&q.0))
        .transpose()
}

const BINARY_SUFFIXES: [(&str, u64); 6] = [
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
];

const DECIMAL_SUFFIXES: [(&str, i64); 7] = [
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

enum Scale {
    Binary(u64),
    Decimal(i64),
}

/// Split a quantity into its number and what the suffix scales it by.
/// `e<n>`/`E<n>` exponents win over the bare `E` (exa) suffix.
fn split_suffix(s: &str) -> (&str, Scale) {
    if let Some(found) = BINARY_SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|n| (n, Scale::Binary(*mult))))
    {
        return found;
    }
    if let Some(pos) = s.rfind(['e', 'E']) {
        if let Ok(exponent) = s[pos + 1..].parse::<i32>() {
            return (&s[..pos], Scale::Decimal(i64::from(exponent)));
        }
    }
    DECIMAL_SUFFIXES
        .iter()
        .find_map(|(suffix, exp)| s.strip_suffix(suffix).map(|n| (n, Scale::Decimal(*exp))))
        .unwrap_or((s, Scale::Decimal(0)))
}

/// Parse a non-negative quantity into units of `10^-precision`, rounding up.
fn parse_scaled(raw: &str, precision: i64) -> Result<u64, QuantityParseError> {
    let raw = raw.trim();
    let (number, scale) = split_suffix(raw);
    if number.starts_with('-') {
        return Err(QuantityParseError::new(raw, "negative quantities are not allowed"));
    }
    let number = number.strip_prefix('+').unwrap_or(number);
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(QuantityParseError::new(raw, "missing number"));
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(QuantityParseError::new(raw, "not a decimal number"));
    }

    let overflow = || QuantityParseError::new(raw, "quantity too large");
    let digits = format!("{int_part}{frac_part}");
    let digits = digits.trim_start_matches('0');
    let mantissa: u128 = if digits.is_empty() {
        0
    } else {
        digits.parse().map_err(|_| overflow())?
    };

    let (multiplier, exponent) = match scale {
        Scale::Binary(mult) => (u128::from(mult), 0),
        Scale::Decimal(exp) => (1, exp),
    };
    let value = mantissa.checked_mul(multiplier).ok_or_else(overflow)?;
    let shift = exponent + precision - frac_part.len() as i64;
    let power = |n: i64| u32::try_from(n).ok().and_then(|n| 10u128.checked_pow(n));

    let scaled = if value == 0 {
        0
    } else if shift >= 0 {
        power(shift)
            .and_then(|factor| value.checked_mul(factor))
            .ok_or_else(overflow)?
    } else {
        // Anything too small to divide out still rounds up to one unit.
        power(-shift).map_or(1, |divisor| value.div_ceil(divisor))
    };
    u64::try_from(scaled).map_err(|_| overflow())
}

/// Parse a Kubernetes CPU quantity into milli-CPU, rounding up.
///
/// Accepts every non-negative form the API server does: whole and
/// fractional cores ("4", "0.5"), any SI suffix ("200m", "1k"), binary
/// suffixes, and exponents ("1e3", "5E-1").
pub fn parse_milli_cpu(s: &str) -> Result<u64, QuantityParseError> {
    parse_scaled(s, 3)
}

/// Parse a Kubernetes memory or storage quantity into bytes, rounding up.
///
/// Accepts binary (Ki..Ei) and decimal (m, k..E) suffixes, exponents, and
/// bare bytes. Milli-bytes ("100m") round up to whole bytes.
pub fn parse_bytes(s: &str) -> Result<u64, QuantityParseError> {
    parse_scaled(s, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cpu_whole_cores() {
        assert_eq!(parse_milli_cpu("4").unwrap(), 4000);
        assert_eq!(parse_milli_cpu("1").unwrap(), 1000);
        assert_eq!(parse_milli_cpu("0").unwrap(), 0);
    }

    #[test]
    fn parse_cpu_millicores() {
        assert_eq!(parse_milli_cpu("200m").unwrap(), 200);
        assert_eq!(parse_milli_cpu("1000m").unwrap(), 1000);
        assert_eq!(parse_milli_cpu("0m").unwrap(), 0);
        assert_eq!(parse_milli_cpu("1.5m").unwrap(), 2); // rounds up
    }

    #[test]
    fn parse_cpu_fractional_cores() {
        assert_eq!(parse_milli_cpu("0.5").unwrap(), 500);
        assert_eq!(parse_milli_cpu("1.25").unwrap(), 1250);
        assert_eq!(parse_milli_cpu(".1").unwrap(), 100);
        assert_eq!(parse_milli_cpu("0.0001").unwrap(), 1); // rounds up
        assert_eq!(parse_milli_cpu("2.5000").unwrap(), 2500);
    }

    #[test]
    fn parse_cpu_invalid_is_err() {
        assert!(parse_milli_cpu("abc").is_err());
        assert!(parse_milli_cpu("").is_err());
        assert!(parse_milli_cpu("xm").is_err());
        assert!(parse_milli_cpu("m").is_err());
        assert!(parse_milli_cpu("1.2.3").is_err());
        assert!(parse_milli_cpu("99999999999999999999").is_err());
    }

    #[test]
    fn parse_cpu_negative_is_err() {
        let err = parse_milli_cpu("-1").unwrap_err();
        assert_eq!(err.raw(), "-1");
        assert!(err.to_string().contains("negative"));
        assert!(parse_milli_cpu("-200m").is_err());
    }

    #[test]
    fn parse_bytes_binary_suffixes() {
        assert_eq!(parse_bytes("100Mi").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_bytes("1Gi").unwrap(), 1 << 30);
        assert_eq!(parse_bytes("1Ki").unwrap(), 1024);
        assert_eq!(parse_bytes("1.5Ki").unwrap(), 1536);
    }

    #[test]
    fn parse_bytes_decimal_suffixes_and_bare() {
        assert_eq!(parse_bytes("1k").unwrap(), 1000);
        assert_eq!(parse_bytes("2M").unwrap(), 2_000_000);
        assert_eq!(parse_bytes("1073741824").unwrap(), 1 << 30);
        assert_eq!(parse_bytes("0").unwrap(), 0);
        assert_eq!(parse_bytes("0.5").unwrap(), 1); // rounds up
    }

    #[test]
    fn parse_bytes_invalid_is_err() {
        assert!(parse_bytes("abc").is_err());
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("xGi").is_err());
        assert!(parse_bytes("-100Mi").is_err());
        assert!(parse_bytes("100Zi").is_err());
    }

    #[test]
    fn parse_exponent_forms() {
        assert_eq!(parse_milli_cpu("1e3").unwrap(), 1_000_000);
        assert_eq!(parse_milli_cpu("5E-1").unwrap(), 500);
        assert_eq!(parse_milli_cpu("2e-4").unwrap(), 1); // rounds up
        assert_eq!(parse_bytes("1e3").unwrap(), 1000);
        assert_eq!(parse_bytes("12E6").unwrap(), 12_000_000);
        // A bare E is still the exa suffix.
        assert_eq!(parse_bytes("2E").unwrap(), 2_000_000_000_000_000_000);
        assert!(parse_bytes("1e").is_err());
        assert!(parse_bytes("1e400").is_err());
    }

    #[test]
    fn parse_bytes_milli_rounds_up() {
        assert_eq!(parse_bytes("100m").unwrap(), 1);
        assert_eq!(parse_bytes("1500m").unwrap(), 2);
        assert_eq!(parse_bytes("0m").unwrap(), 0);
    }

    #[test]
    fn parse_cpu_other_suffixes() {
        assert_eq!(parse_milli_cpu("1k").unwrap(), 1_000_000);
        assert_eq!(parse_milli_cpu("1Ki").unwrap(), 1_024_000);
    }

    #[test]
    fn descriptor_validate_reports_offending_quantity() {
        let bad = ResourceDescriptor::default().with_cpu("1", "lots");
        let err = bad.validate().unwrap_err();
        assert_eq!(err.raw(), "lots");

        let bad_memory = ResourceDescriptor::default().with_memory("100Mi", "-1Gi");
        assert!(bad_memory.validate().is_err());
    }

    #[test]
    fn empty_descriptor_is_valid_and_has_no_limit() {
        let descriptor = ResourceDescriptor::default();
        assert!(descriptor.validate().is_ok());
        assert_eq!(descriptor.cpu_limit_milli().unwrap(), None);
    }

    #[test]
    fn to_requirements_omits_unset_fields() {
        let burstable = ResourceDescriptor {
            cpu_request: Some("100m".into()),
            cpu_limit: Some("200m".into()),
            mem_request: Some("100Mi".into()),
            ..Default::default()
        };
        let req = burstable.to_requirements();
        let limits = req.limits.unwrap();
        assert_eq!(limits.len(), 1);
        assert_eq!(limits["cpu"], Quantity("200m".into()));
        let requests = req.requests.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests["memory"], Quantity("100Mi".into()));
    }

    #[test]
    fn to_requirements_empty_descriptor_has_no_maps() {
        let req = ResourceDescriptor::default().to_requirements();
        assert!(req.limits.is_none());
        assert!(req.requests.is_none());
    }

    #[test]
    fn to_requirements_keeps_zero_values() {
        let req = ResourceDescriptor::default()
            .with_cpu("0", "0")
            .to_requirements();
        assert_eq!(req.limits.unwrap()["cpu"], Quantity("0".into()));
    }

    #[test]
    fn cpu_limit_milli_reads_container_limits() {
        let req = ResourceDescriptor::default()
            .with_cpu("1", "1")
            .with_memory("100Mi", "100Mi")
            .to_requirements();
        assert_eq!(cpu_limit_milli(Some(&req)).unwrap(), Some(1000));
        assert_eq!(cpu_limit_milli(None).unwrap(), None);
        assert_eq!(
            cpu_limit_milli(Some(&ResourceRequirements::default())).unwrap(),
            None
        );
    }

    #[test]
    fn descriptor_deserializes_from_yaml() {
        let yaml = "cpuRequest: 100m\ncpuLimit: 200m\nmemLimit: 100Mi\n";
        let descriptor: ResourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.cpu_request.as_deref(), Some("100m"));
        assert_eq!(descriptor.cpu_limit.as_deref(), Some("200m"));
        assert_eq!(descriptor.mem_request, None);
        assert_eq!(descriptor.mem_limit.as_deref(), Some("100Mi"));
    }
}
