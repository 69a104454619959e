use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{RunSummary, SiteResult, TestPointMetadata};

/// Submission-ready record: one run summary merged with test-point metadata.
///
/// Metadata that was never detected (ASN, address prefixes) is left out of
/// the serialized form instead of being written as an empty string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub test_point_id: String,
    pub location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub score: u8,
    pub ipv4_success: bool,
    pub ipv6_success: bool,
    pub site_test_count: usize,
    pub ipv4_success_count: usize,
    pub ipv6_success_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_prefix: Option<String>,
    pub sites: Vec<SiteResult>,
}

impl ResultRecord {
    /// `YYYY-MM-DD` of the capture time, used to key stored results.
    pub fn date(&self) -> String {
        self.timestamp.date().to_string()
    }

    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
    }
}

/// Merge a run summary with test-point metadata. Pure; no I/O.
///
/// An empty ASN or prefix string is treated as not detected and omitted from
/// the record, the same as `None`.
pub fn assemble(summary: RunSummary, metadata: TestPointMetadata) -> ResultRecord {
    let RunSummary {
        sites,
        ipv4_successes,
        ipv6_successes,
        score,
        ipv4_success,
        ipv6_success,
        timestamp,
        site_count,
    } = summary;
    let TestPointMetadata {
        test_point_id,
        location,
        asn,
        ipv4_prefix,
        ipv6_prefix,
    } = metadata;

    ResultRecord {
        test_point_id,
        location,
        timestamp,
        score,
        ipv4_success,
        ipv6_success,
        site_test_count: site_count,
        ipv4_success_count: ipv4_successes,
        ipv6_success_count: ipv6_successes,
        asn: asn.filter(|s| !s.is_empty()),
        ipv4_prefix: ipv4_prefix.filter(|s| !s.is_empty()),
        ipv6_prefix: ipv6_prefix.filter(|s| !s.is_empty()),
        sites,
    }
}
