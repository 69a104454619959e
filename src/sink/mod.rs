//! Delivery of a finished [`ResultRecord`] to durable or remote stores.
//!
//! Every backend implements [`ResultSink`]. Sinks run after the measurement,
//! one after another, and a failing sink only produces a warning.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::SubmitError;
use crate::report::ResultRecord;

pub mod collector;
pub mod gh_cli;
pub mod git_push;
pub mod github_api;

pub use collector::CollectorSink;
pub use gh_cli::{GhCliSink, GhMethod};
pub use git_push::GitPushSink;
pub use github_api::GitHubApiSink;

/// Directory inside a results repository that holds one JSON file per run.
pub const RESULTS_DIR: &str = "test-runs/individual";

#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver the record. `Ok` carries a short human-readable receipt.
    async fn submit(&self, record: &ResultRecord) -> Result<String, SubmitError>;
}

#[derive(Debug)]
pub struct SinkReport {
    pub sink: String,
    pub result: Result<String, SubmitError>,
}

/// Run every sink in order. Failures are logged and returned, never raised.
pub async fn submit_all(sinks: &[Box<dyn ResultSink>], record: &ResultRecord) -> Vec<SinkReport> {
    let mut reports = Vec::with_capacity(sinks.len());
    for sink in sinks {
        info!(sink = sink.name(), "submitting results");
        let result = sink.submit(record).await;
        match &result {
            Ok(receipt) => info!(sink = sink.name(), receipt = %receipt, "submission succeeded"),
            Err(e) => warn!(sink = sink.name(), error = %e, "submission failed"),
        }
        reports.push(SinkReport {
            sink: sink.name().to_string(),
            result,
        });
    }
    reports
}

pub fn issue_title(record: &ResultRecord) -> String {
    format!(
        "IPv6 Test Results: {} - {}",
        record.test_point_id,
        record.date()
    )
}

/// Markdown body used for issues and pull requests.
pub fn issue_body(record: &ResultRecord) -> Result<String, SubmitError> {
    let json = serde_json::to_string_pretty(record)?;
    Ok(format!(
        "## IPv6 Connectivity Test Results\n\n\
         **Test Point:** {}\n\
         **Location:** {}\n\
         **Timestamp:** {}\n\n\
         ### Results\n\
         ```json\n{}\n```\n\n\
         ---\n\
         *Submitted by v6probe*",
        record.test_point_id,
        record.location,
        record.timestamp_rfc3339(),
        json
    ))
}

/// Repository-relative path of the result file, keyed by test point and date.
pub fn results_file_path(record: &ResultRecord) -> String {
    format!(
        "{RESULTS_DIR}/{}-{}.json",
        path_safe(&record.test_point_id),
        record.date()
    )
}

/// Replace anything that could escape a single path or ref component.
pub(crate) fn path_safe(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Write the pretty-printed record to `rel` under `root`, creating parent directories.
pub(crate) async fn write_record_file(
    root: &Path,
    rel: &str,
    record: &ResultRecord,
) -> Result<(), SubmitError> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(&path, json).await?;
    Ok(())
}

/// Run an external tool and return its trimmed stdout.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
) -> Result<String, SubmitError> {
    let command = format!("{program} {}", args.first().copied().unwrap_or_default())
        .trim_end()
        .to_string();
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    debug!(%command, "running external command");

    let output = cmd.output().await.map_err(|e| SubmitError::Command {
        command: command.clone(),
        detail: e.to_string(),
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        };
        return Err(SubmitError::Command { command, detail });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use crate::report::ResultRecord;
    use crate::types::{Family, ProbeOutcome, SiteResult};
    use std::time::Duration;
    use time::macros::datetime;

    pub(crate) fn record(id: &str) -> ResultRecord {
        ResultRecord {
            test_point_id: id.into(),
            location: "Oslo".into(),
            timestamp: datetime!(2026-10-15 08:30:00 UTC),
            score: 6,
            ipv4_success: true,
            ipv6_success: true,
            site_test_count: 1,
            ipv4_success_count: 1,
            ipv6_success_count: 1,
            asn: Some("AS2119".into()),
            ipv4_prefix: Some("198.51.100.0".into()),
            ipv6_prefix: None,
            sites: vec![SiteResult {
                name: "Example".into(),
                url: "https://example.com".into(),
                ipv4: ProbeOutcome::succeeded(Family::V4, Duration::from_millis(12)),
                ipv6: ProbeOutcome::succeeded(Family::V6, Duration::from_millis(15)),
            }],
        }
    }

    /// Serve one canned HTTP response and hand back the raw request text.
    pub(crate) async fn one_shot(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            let resp = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });
        (format!("http://{addr}"), rx)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= end + 4 + len
    }
}

#[cfg(test)]
mod tests {
    use super::testing::record;
    use super::*;

    struct Fixed(Result<&'static str, u16>);

    #[async_trait]
    impl ResultSink for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn submit(&self, _record: &ResultRecord) -> Result<String, SubmitError> {
            match self.0 {
                Ok(s) => Ok(s.to_string()),
                Err(status) => Err(SubmitError::HttpStatus {
                    status,
                    body: String::new(),
                }),
            }
        }
    }

    #[test]
    fn title_and_path_are_keyed_by_test_point_and_date() {
        let rec = record("edge-01");
        assert_eq!(issue_title(&rec), "IPv6 Test Results: edge-01 - 2026-10-15");
        assert_eq!(
            results_file_path(&rec),
            "test-runs/individual/edge-01-2026-10-15.json"
        );
    }

    #[test]
    fn path_components_are_sanitised() {
        assert_eq!(path_safe("../etc/passwd"), "-etc-passwd");
        assert_eq!(path_safe("host name"), "host-name");
        assert_eq!(path_safe(".."), "unknown");
    }

    #[test]
    fn body_embeds_pretty_json() {
        let body = issue_body(&record("edge-01")).unwrap();
        assert!(body.starts_with("## IPv6 Connectivity Test Results"));
        assert!(body.contains("**Location:** Oslo"));
        assert!(body.contains("**Timestamp:** 2026-10-15T08:30:00Z"));
        assert!(body.contains("\"testPointId\": \"edge-01\""));
        assert!(!body.contains("ipv6Prefix"));
    }

    #[tokio::test]
    async fn submit_all_reports_each_sink_independently() {
        let sinks: Vec<Box<dyn ResultSink>> = vec![
            Box::new(Fixed(Err(500))),
            Box::new(Fixed(Ok("stored"))),
        ];
        let reports = submit_all(&sinks, &record("edge-01")).await;
        assert_eq!(reports.len(), 2);
        assert!(reports[0].result.is_err());
        assert_eq!(reports[1].result.as_deref().unwrap(), "stored");
    }

    #[tokio::test]
    async fn missing_tool_is_a_command_error() {
        let err = run_command("v6probe-no-such-tool", &["status"], None)
            .await
            .unwrap_err();
        match err {
            SubmitError::Command { command, .. } => {
                assert_eq!(command, "v6probe-no-such-tool status")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn record_file_lands_under_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record("edge-01");
        let rel = results_file_path(&rec);
        write_record_file(dir.path(), &rel, &rec).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join(&rel)).unwrap();
        let back: ResultRecord = serde_json::from_str(&written).unwrap();
        assert_eq!(back, rec);
    }
}
