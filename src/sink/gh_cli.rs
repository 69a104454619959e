use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use time::macros::format_description;

use super::{issue_body, issue_title, path_safe, results_file_path, run_command, write_record_file, ResultSink};
use crate::error::SubmitError;
use crate::report::ResultRecord;

/// How the GitHub CLI delivers results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GhMethod {
    #[default]
    Issue,
    Pr,
}

impl FromStr for GhMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "issue" => Ok(GhMethod::Issue),
            "pr" => Ok(GhMethod::Pr),
            other => Err(format!("expected 'issue' or 'pr', got '{other}'")),
        }
    }
}

impl fmt::Display for GhMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GhMethod::Issue => f.write_str("issue"),
            GhMethod::Pr => f.write_str("pr"),
        }
    }
}

/// Submits through an authenticated `gh` CLI, as an issue or as a pull
/// request adding the result file.
pub struct GhCliSink {
    repo: String,
    method: GhMethod,
}

impl GhCliSink {
    pub fn new(repo: impl Into<String>, method: GhMethod) -> Self {
        Self {
            repo: repo.into(),
            method,
        }
    }

    async fn create_issue(&self, record: &ResultRecord) -> Result<String, SubmitError> {
        let title = issue_title(record);
        let body = issue_body(record)?;
        let out = run_command(
            "gh",
            &["issue", "create", "--repo", &self.repo, "--title", &title, "--body", &body],
            None,
        )
        .await?;
        Ok(receipt("issue", &out))
    }

    async fn create_pr(&self, record: &ResultRecord) -> Result<String, SubmitError> {
        let title = issue_title(record);
        let body = issue_body(record)?;
        let branch = pr_branch_name(record);
        let file = results_file_path(record);
        let message = format!("Add test results for {}", record.test_point_id);

        let workdir = tempfile::Builder::new().prefix("v6probe-").tempdir()?;
        let dir = Some(workdir.path());

        run_command("gh", &["repo", "clone", &self.repo, ".", "--", "--depth", "1"], dir).await?;
        run_command("git", &["checkout", "-b", &branch], dir).await?;
        write_record_file(workdir.path(), &file, record).await?;
        run_command("git", &["add", &file], dir).await?;
        run_command("git", &["commit", "-m", &message], dir).await?;
        run_command("git", &["push", "origin", &branch], dir).await?;
        let out = run_command(
            "gh",
            &[
                "pr", "create", "--repo", &self.repo, "--title", &title, "--body", &body, "--head",
                &branch,
            ],
            dir,
        )
        .await?;
        Ok(receipt("pull request", &out))
    }
}

#[async_trait]
impl ResultSink for GhCliSink {
    fn name(&self) -> &str {
        "gh-cli"
    }

    async fn submit(&self, record: &ResultRecord) -> Result<String, SubmitError> {
        match self.method {
            GhMethod::Issue => self.create_issue(record).await,
            GhMethod::Pr => self.create_pr(record).await,
        }
    }
}

/// `test-results-<id>-<YYYYMMDDhhmmss>` from the capture time.
pub fn pr_branch_name(record: &ResultRecord) -> String {
    let stamp = record
        .timestamp
        .format(format_description!("[year][month][day][hour][minute][second]"))
        .unwrap_or_else(|_| record.date().replace('-', ""));
    format!("test-results-{}-{}", path_safe(&record.test_point_id), stamp)
}

fn receipt(kind: &str, gh_output: &str) -> String {
    // gh prints the URL of what it created on the last line.
    match gh_output.lines().last().map(str::trim) {
        Some(url) if url.starts_with("http") => format!("submitted as GitHub {kind}: {url}"),
        _ => format!("submitted as GitHub {kind}"),
    }
}
