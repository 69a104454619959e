use async_trait::async_trait;

use super::{results_file_path, run_command, write_record_file, ResultSink};
use crate::error::SubmitError;
use crate::report::ResultRecord;

pub const DEFAULT_BRANCH: &str = "main";

/// Commits the result file straight onto a branch of a git repository.
///
/// Works from a shallow clone in a temporary directory that is removed when
/// the submission finishes, whatever the outcome.
pub struct GitPushSink {
    repo_url: String,
    branch: String,
}

impl GitPushSink {
    pub fn new(repo_url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: branch.into(),
        }
    }
}

#[async_trait]
impl ResultSink for GitPushSink {
    fn name(&self) -> &str {
        "git-push"
    }

    async fn submit(&self, record: &ResultRecord) -> Result<String, SubmitError> {
        let file = results_file_path(record);
        let message = commit_message(record);

        let workdir = tempfile::Builder::new().prefix("v6probe-").tempdir()?;
        let dir = Some(workdir.path());

        run_command(
            "git",
            &["clone", "--depth", "1", "--branch", &self.branch, &self.repo_url, "."],
            dir,
        )
        .await?;
        write_record_file(workdir.path(), &file, record).await?;
        run_command("git", &["add", &file], dir).await?;
        run_command("git", &["commit", "-m", &message], dir).await?;
        run_command("git", &["push", "origin", &self.branch], dir).await?;

        Ok(format!(
            "pushed {file} to {} ({})",
            self.repo_url, self.branch
        ))
    }
}

pub fn commit_message(record: &ResultRecord) -> String {
    format!(
        "Add test results for {} - {}",
        record.test_point_id,
        record.date()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::record;

    #[test]
    fn commit_message_names_test_point_and_day() {
        assert_eq!(
            commit_message(&record("edge-01")),
            "Add test results for edge-01 - 2026-10-15"
        );
    }

    #[tokio::test]
    async fn unreachable_repository_fails_cleanly() {
        let missing = tempfile::tempdir().unwrap();
        let url = missing.path().join("absent.git");
        let sink = GitPushSink::new(url.to_string_lossy(), DEFAULT_BRANCH);
        let err = sink.submit(&record("edge-01")).await.unwrap_err();
        // Either git is not installed or the clone fails; both surface as command errors.
        assert!(matches!(err, SubmitError::Command { .. }), "{err}");
    }
}
