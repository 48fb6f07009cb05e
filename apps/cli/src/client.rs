//! HTTP client for the Switchboard intake.

use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default intake address.
pub const DEFAULT_SERVER: &str = "http://localhost:5000";

/// One task submission, as sent to `/perform_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_type: String,
    pub model_name: String,
    pub prompt: String,
}

/// Server's answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// Queued; carries the assigned task id.
    Accepted(String),
    /// Refused, with the server's error message.
    Rejected { status: u16, error: String },
}

/// Thin wrapper over `reqwest` for the intake endpoints.
#[derive(Debug, Clone)]
pub struct SwitchboardClient {
    base_url: String,
    client: reqwest::Client,
}

impl SwitchboardClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    /// Post one task.
    ///
    /// A 4xx/5xx answer is returned as [`SubmitResponse::Rejected`]; only transport
    /// failures are errors.
    pub async fn submit(&self, task: &TaskSubmission) -> anyhow::Result<SubmitResponse> {
        let url = format!("{}/perform_task", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(task)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            let task_id = body.get("task_id").and_then(Value::as_str).unwrap_or_default().to_string();
            Ok(SubmitResponse::Accepted(task_id))
        } else {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .map_or_else(|| status.to_string(), ToString::to_string);
            Ok(SubmitResponse::Rejected { status: status.as_u16(), error })
        }
    }

    /// Fetch `/status` as raw JSON.
    pub async fn status(&self) -> anyhow::Result<Value> {
        let url = format!("{}/status", self.base_url);
        let response =
            self.client.get(&url).send().await.with_context(|| format!("Failed to reach {}", url))?;
        if !response.status().is_success() {
            bail!("Status request failed: {}", response.status());
        }
        response.json().await.context("Invalid status response")
    }
}
