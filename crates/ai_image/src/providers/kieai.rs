//! kie.ai provider
//!
//! Creates a task through `POST /api/v1/jobs/createTask`, polls
//! `GET /api/v1/jobs/recordInfo?taskId=...` until the task reaches `success`
//! or `fail`, then downloads the first result URL.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{download, http_client};
use crate::config::KieAiConfig;
use crate::error::ProviderError;
use crate::mapping::{KIEAI_ASPECT_RATIOS, nearest_aspect_ratio};
use crate::polling::{PollPolicy, PollStatus, poll_until};
use crate::ports::ImageProvider;
use crate::types::GenerationRequest;

/// Z-Image served through kie.ai tasks
#[derive(Debug, Clone)]
pub struct KieAiZImageProvider {
    client: Client,
    downloads: Client,
    config: KieAiConfig,
}

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    model: &'a str,
    input: TaskInput<'a>,
}

#[derive(Debug, Serialize)]
struct TaskInput<'a> {
    prompt: &'a str,
    aspect_ratio: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(default)]
    data: Option<CreateTaskData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskData {
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordInfoResponse {
    #[serde(default)]
    data: Option<RecordInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfo {
    #[serde(default)]
    state: Option<TaskState>,
    #[serde(default)]
    result_json: Option<String>,
    #[serde(default)]
    fail_msg: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaskState {
    Success,
    Fail,
    #[serde(other)]
    Waiting,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResult {
    #[serde(default)]
    result_urls: Vec<String>,
}

impl KieAiZImageProvider {
    /// Display name
    pub const NAME: &'static str = "Z-Image (kie.ai)";

    /// Create a new kie.ai provider
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if an HTTP client cannot be
    /// built.
    pub fn new(config: KieAiConfig, download_timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(Duration::from_millis(config.request_timeout_ms))?,
            downloads: http_client(download_timeout)?,
            config,
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::Configuration("KIEAI_API_KEY not set".to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/jobs/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn create_task(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<String, ProviderError> {
        let bucket = nearest_aspect_ratio(KIEAI_ASPECT_RATIOS, request.width, request.height);
        debug!(aspect_ratio = bucket.label, "Mapped size to aspect ratio");

        let body = CreateTaskRequest {
            model: &self.config.z_image_model,
            input: TaskInput {
                prompt: &request.prompt,
                aspect_ratio: bucket.label,
            },
        };

        let response = self
            .client
            .post(self.endpoint("createTask"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status("kie.ai create task", status, &body));
        }

        let text = response.text().await?;
        let parsed: CreateTaskResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::parse(format!("Invalid kie.ai create response: {e}"), &text))?;
        parsed
            .data
            .and_then(|data| data.task_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::parse("No taskId in kie.ai response", &text))
    }

    async fn poll_once(&self, api_key: &str, task_id: &str) -> Result<PollStatus<String>, ProviderError> {
        let response = match self
            .client
            .get(self.endpoint("recordInfo"))
            .query(&[("taskId", task_id)])
            .bearer_auth(api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "kie.ai poll request failed");
                return Ok(PollStatus::Pending);
            },
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "kie.ai poll error");
            return Ok(PollStatus::Pending);
        }

        let info = match response.json::<RecordInfoResponse>().await {
            Ok(parsed) => parsed.data,
            Err(e) => {
                warn!(error = %e, "Unreadable kie.ai poll response");
                return Ok(PollStatus::Pending);
            },
        };
        let Some(info) = info else {
            return Ok(PollStatus::Pending);
        };

        debug!(state = ?info.state, "kie.ai task state");
        match info.state {
            Some(TaskState::Success) => result_url(info.result_json.as_deref()).map(PollStatus::Done),
            Some(TaskState::Fail) => Err(ProviderError::Remote(format!(
                "kie.ai generation failed: {}",
                info.fail_msg.as_deref().filter(|m| !m.is_empty()).unwrap_or("unknown")
            ))),
            Some(TaskState::Waiting) | None => Ok(PollStatus::Pending),
        }
    }
}

/// First URL of the `resultJson` string
fn result_url(result_json: Option<&str>) -> Result<String, ProviderError> {
    let raw = result_json.unwrap_or("{}");
    let result: TaskResult = serde_json::from_str(raw)
        .map_err(|e| ProviderError::parse(format!("Invalid kie.ai resultJson: {e}"), &raw))?;
    result
        .result_urls
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::parse("kie.ai task succeeded without resultUrls", &raw))
}

#[async_trait]
impl ImageProvider for KieAiZImageProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self, request), fields(model = %self.config.z_image_model, width = request.width, height = request.height))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes, ProviderError> {
        let api_key = self.api_key()?;

        let task_id = self.create_task(api_key, request).await?;
        info!(task_id = %task_id, "kie.ai task created");

        let policy = PollPolicy::from_millis(self.config.poll_interval_ms, self.config.poll_timeout_ms);
        let id = task_id.as_str();
        let image_url = poll_until(&policy, Self::NAME, move || self.poll_once(api_key, id)).await?;

        info!("kie.ai task finished, downloading image");
        download(&self.downloads, &image_url).await
    }
}
