//! Test-point identification: hostname, public addresses and ASN.
//!
//! Every lookup is best-effort. Failures are logged at debug level and leave
//! the corresponding field empty; detection never aborts a run.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use tokio::time;
use tracing::debug;

use crate::redact::{redact_ipv4, redact_ipv6};
use crate::types::{Family, TestPointMetadata};

pub const DEFAULT_IPV4_ECHO_URL: &str = "https://api.ipify.org";
pub const DEFAULT_IPV6_ECHO_URL: &str = "https://api64.ipify.org";
pub const DEFAULT_ASN_LOOKUP_BASE: &str = "https://ipinfo.io";
const UNKNOWN: &str = "unknown";

/// Values supplied by the user that take precedence over detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOverrides {
    pub test_point_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataProvider {
    pub ipv4_echo_url: String,
    pub ipv6_echo_url: String,
    /// ASN is fetched from `<base>/<ipv4>/org`.
    pub asn_lookup_base: String,
    pub request_timeout: Duration,
    pub overall_timeout: Duration,
}

impl Default for MetadataProvider {
    fn default() -> Self {
        Self {
            ipv4_echo_url: DEFAULT_IPV4_ECHO_URL.into(),
            ipv6_echo_url: DEFAULT_IPV6_ECHO_URL.into(),
            asn_lookup_base: DEFAULT_ASN_LOOKUP_BASE.into(),
            request_timeout: Duration::from_secs(5),
            overall_timeout: Duration::from_secs(10),
        }
    }
}

impl MetadataProvider {
    /// Identify the test point and look up its public prefixes and ASN.
    ///
    /// Both address lookups run concurrently; the ASN lookup needs the IPv4
    /// address and only runs once that is known.
    pub async fn detect(&self, overrides: &MetadataOverrides) -> TestPointMetadata {
        let mut meta = local_identity(overrides);

        let lookups = async {
            let (v4, v6) = tokio::join!(
                self.public_address(Family::V4),
                self.public_address(Family::V6)
            );
            let asn = match v4 {
                Some(ip) => self.asn(ip).await,
                None => None,
            };
            (v4, v6, asn)
        };

        match time::timeout(self.overall_timeout, lookups).await {
            Ok((v4, v6, asn)) => {
                meta.ipv4_prefix = v4.map(|ip| redact_ipv4(&ip.to_string()));
                meta.ipv6_prefix = v6.map(|ip| redact_ipv6(&ip.to_string()));
                meta.asn = asn;
            }
            Err(_) => debug!(
                timeout_ms = self.overall_timeout.as_millis() as u64,
                "test point detection timed out"
            ),
        }
        meta
    }

    /// Ask the echo service for our public address over `family` only.
    async fn public_address(&self, family: Family) -> Option<IpAddr> {
        let url = match family {
            Family::V4 => &self.ipv4_echo_url,
            Family::V6 => &self.ipv6_echo_url,
        };
        let body = match self.fetch_text(url, Some(family)).await {
            Ok(body) => body,
            Err(e) => {
                debug!(%family, %url, error = %e, "public address lookup failed");
                return None;
            }
        };
        match body.trim().parse::<IpAddr>() {
            Ok(ip) if family.matches(&ip) => Some(ip),
            _ => {
                debug!(%family, body = body.trim(), "echo service returned no usable address");
                None
            }
        }
    }

    async fn asn(&self, ipv4: IpAddr) -> Option<String> {
        let url = format!("{}/{}/org", self.asn_lookup_base.trim_end_matches('/'), ipv4);
        match self.fetch_text(&url, None).await {
            Ok(body) => parse_asn(&body),
            Err(e) => {
                debug!(%url, error = %e, "ASN lookup failed");
                None
            }
        }
    }

    async fn fetch_text(&self, url: &str, family: Option<Family>) -> reqwest::Result<String> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .no_proxy();
        // Binding the unspecified address of one family restricts the
        // connector to destinations of that family.
        builder = match family {
            Some(Family::V4) => builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            Some(Family::V6) => builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
            None => builder,
        };
        let client = builder.build()?;
        client.get(url).send().await?.error_for_status()?.text().await
    }
}

/// Identity fields that need no network access.
pub fn local_identity(overrides: &MetadataOverrides) -> TestPointMetadata {
    let test_point_id = non_empty(overrides.test_point_id.as_deref())
        .map(str::to_string)
        .unwrap_or_else(hostname);
    let location = non_empty(overrides.location.as_deref())
        .unwrap_or(UNKNOWN)
        .to_string();
    TestPointMetadata {
        test_point_id,
        location,
        ..Default::default()
    }
}

/// ASN lookups answer `AS13335 Cloudflare, Inc.`; keep the first word.
pub fn parse_asn(body: &str) -> Option<String> {
    body.split_whitespace().next().map(str::to_string)
}

fn hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
