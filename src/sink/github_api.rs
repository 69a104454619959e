use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::json;

use super::{issue_body, issue_title, ResultSink};
use crate::error::SubmitError;
use crate::report::ResultRecord;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LABELS: [&str; 2] = ["test-results", "automated"];

/// Opens an issue carrying the record through the GitHub REST API.
pub struct GitHubApiSink {
    repo: String,
    token: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    #[serde(default)]
    html_url: Option<String>,
}

impl GitHubApiSink {
    pub fn new(repo: impl Into<String>, token: impl Into<String>) -> Result<Self, SubmitError> {
        Self::with_api_base(repo, token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        repo: impl Into<String>,
        token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, SubmitError> {
        // GitHub rejects requests without a User-Agent.
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("v6probe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            repo: repo.into(),
            token: token.into(),
            api_base: api_base.into(),
            client,
        })
    }
}

#[async_trait]
impl ResultSink for GitHubApiSink {
    fn name(&self) -> &str {
        "github-api"
    }

    async fn submit(&self, record: &ResultRecord) -> Result<String, SubmitError> {
        let url = format!(
            "{}/repos/{}/issues",
            self.api_base.trim_end_matches('/'),
            self.repo
        );
        let payload = json!({
            "title": issue_title(record),
            "body": issue_body(record)?,
            "labels": LABELS,
        });

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(ACCEPT, "application/vnd.github.v3+json")
            .json(&payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status != 201 {
            return Err(SubmitError::HttpStatus {
                status,
                body: body.trim().to_string(),
            });
        }

        match serde_json::from_str::<IssueResponse>(&body)
            .ok()
            .and_then(|r| r.html_url)
        {
            Some(issue) => Ok(format!("issue created: {issue}")),
            None => Ok(format!("issue created in {}", self.repo)),
        }
    }
}
