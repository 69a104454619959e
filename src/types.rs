use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use time::OffsetDateTime;

/// A named site to probe. Immutable once the target list is built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub url: String,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// IP transport family. Serialized as the bare number `4` or `6`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub const BOTH: [Family; 2] = [Family::V4, Family::V6];

    pub fn matches(self, ip: &IpAddr) -> bool {
        matches!(
            (self, ip),
            (Family::V4, IpAddr::V4(_)) | (Family::V6, IpAddr::V6(_))
        )
    }

    /// Slot index used when collecting per-family outcomes.
    pub(crate) fn index(self) -> usize {
        match self {
            Family::V4 => 0,
            Family::V6 => 1,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}

impl From<Family> for u8 {
    fn from(f: Family) -> u8 {
        match f {
            Family::V4 => 4,
            Family::V6 => 6,
        }
    }
}

impl TryFrom<u8> for Family {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            4 => Ok(Family::V4),
            6 => Ok(Family::V6),
            other => Err(format!("unknown address family: {other}")),
        }
    }
}

/// Result of a single (target, family) attempt.
///
/// `latency` is set only on success and `error` only on failure; use the
/// constructors to keep the two consistent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub family: Family,
    pub success: bool,
    #[serde(
        rename = "latencyMs",
        with = "millis",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub latency: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn succeeded(family: Family, latency: Duration) -> Self {
        Self {
            family,
            success: true,
            latency: Some(latency),
            error: None,
        }
    }

    pub fn failed(family: Family, error: impl Into<String>) -> Self {
        Self {
            family,
            success: false,
            latency: None,
            error: Some(error.into()),
        }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency.map(|d| d.as_millis() as u64)
    }
}

/// Both family outcomes for one target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SiteResult {
    pub name: String,
    pub url: String,
    pub ipv4: ProbeOutcome,
    pub ipv6: ProbeOutcome,
}

impl SiteResult {
    pub fn outcome(&self, family: Family) -> &ProbeOutcome {
        match family {
            Family::V4 => &self.ipv4,
            Family::V6 => &self.ipv6,
        }
    }
}

/// Aggregate of one full run, in target list order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub sites: Vec<SiteResult>,
    pub ipv4_successes: usize,
    pub ipv6_successes: usize,
    pub score: u8,
    pub ipv4_success: bool,
    pub ipv6_success: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub site_count: usize,
}

/// Identifying data about the vantage point. Addresses are already redacted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestPointMetadata {
    pub test_point_id: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_prefix: Option<String>,
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_u64(d.as_millis() as u64),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Family::V6).unwrap(), "6");
        let f: Family = serde_json::from_str("4").unwrap();
        assert_eq!(f, Family::V4);
        assert!(serde_json::from_str::<Family>("5").is_err());
    }

    #[test]
    fn outcome_fields_follow_success() {
        let ok = ProbeOutcome::succeeded(Family::V4, Duration::from_millis(42));
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["latencyMs"], 42);
        assert!(v.get("error").is_none());

        let bad = ProbeOutcome::failed(Family::V6, "connection refused");
        let v = serde_json::to_value(&bad).unwrap();
        assert!(v.get("latencyMs").is_none());
        assert_eq!(v["error"], "connection refused");
        assert_eq!(v["family"], 6);
    }

    #[test]
    fn family_matches_address_kind() {
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(Family::V4.matches(&v4));
        assert!(!Family::V4.matches(&v6));
        assert!(Family::V6.matches(&v6));
    }
}
