use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::ResultSink;
use crate::error::SubmitError;
use crate::report::ResultRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts the record as JSON to a remote collector using a bearer token.
pub struct CollectorSink {
    url: String,
    token: String,
    client: reqwest::Client,
}

/// Fields the collector may echo back; all optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectorResponse {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl CollectorSink {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("v6probe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            url: url.into(),
            token: token.into(),
            client,
        })
    }
}

#[async_trait]
impl ResultSink for CollectorSink {
    fn name(&self) -> &str {
        "collector"
    }

    async fn submit(&self, record: &ResultRecord) -> Result<String, SubmitError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(record)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !matches!(status, 200 | 201) {
            return Err(SubmitError::HttpStatus {
                status,
                body: body.trim().to_string(),
            });
        }

        // A non-JSON acknowledgement still counts as accepted.
        let ack: CollectorResponse = serde_json::from_str(&body).unwrap_or_default();
        let mut receipt = format!("accepted by {} (HTTP {status})", self.url);
        if let Some(job) = ack.job_id.filter(|j| !j.is_empty()) {
            receipt.push_str(&format!(", job {job}"));
        }
        if let Some(msg) = ack.message.filter(|m| !m.is_empty()) {
            receipt.push_str(&format!(": {msg}"));
        }
        Ok(receipt)
    }
}
