//! Leonardo.AI provider
//!
//! Submits a generation through the v2 API, then polls the v1 generation
//! record until it is `COMPLETE` or `FAILED`, and downloads the first image.
//!
//! Size handling depends on the model:
//! - `gpt-image-1.5` only renders 1024x1024, 1536x1024 and 1024x1536
//! - Seedream models take 256..=1440 in multiples of 8
//! - anything else receives the requested size unchanged

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{download, http_client};
use crate::config::LeonardoConfig;
use crate::error::ProviderError;
use crate::mapping::{GPT_IMAGE_RESOLUTIONS, SEEDREAM_DIMENSIONS, closest_resolution};
use crate::polling::{PollPolicy, PollStatus, poll_until};
use crate::ports::ImageProvider;
use crate::types::GenerationRequest;

const GPT_IMAGE_MODEL: &str = "gpt-image-1.5";

/// Timeout of a single status request
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Leonardo.AI generations provider
#[derive(Debug, Clone)]
pub struct LeonardoProvider {
    client: Client,
    downloads: Client,
    config: LeonardoConfig,
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerationRequestBody<'a> {
    model: &'a str,
    public: bool,
    parameters: GenerationParameters<'a>,
}

#[derive(Debug, Serialize)]
struct GenerationParameters<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    quantity: u32,
    prompt_enhance: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerationRecordResponse {
    #[serde(default)]
    generations_by_pk: Option<OneOrMany<GenerationRecord>>,
}

/// The record endpoint has been seen answering with a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_first(self) -> Option<T> {
        match self {
            Self::One(item) => Some(item),
            Self::Many(items) => items.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerationRecord {
    #[serde(default)]
    status: Option<GenerationStatus>,
    #[serde(default)]
    generated_images: Vec<GeneratedImageRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum GenerationStatus {
    Pending,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct GeneratedImageRecord {
    #[serde(default)]
    url: Option<String>,
}

impl LeonardoProvider {
    /// Create a new Leonardo provider
    ///
    /// A missing API key is not an error here; `generate` reports it.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if an HTTP client cannot be
    /// built.
    pub fn new(config: LeonardoConfig, download_timeout: Duration) -> Result<Self, ProviderError> {
        let client = http_client(Duration::from_millis(config.submit_timeout_ms))?;
        let downloads = http_client(download_timeout)?;
        let name = format!("Leonardo.AI ({})", config.model_id);
        Ok(Self {
            client,
            downloads,
            config,
            name,
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::Configuration("LEONARDO_API_KEY not set".to_string()))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn is_gpt_image(&self) -> bool {
        self.config.model_id == GPT_IMAGE_MODEL
    }

    /// Size sent to the model for the requested size
    fn model_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.is_gpt_image() {
            closest_resolution(GPT_IMAGE_RESOLUTIONS, width, height)
        } else if self.config.model_id.to_lowercase().contains("seedream") {
            SEEDREAM_DIMENSIONS.apply_pair(width, height)
        } else {
            (width, height)
        }
    }

    async fn submit(&self, api_key: &str, request: &GenerationRequest) -> Result<String, ProviderError> {
        let (width, height) = self.model_size(request.width, request.height);
        if (width, height) != (request.width, request.height) {
            info!(
                requested = %format!("{}x{}", request.width, request.height),
                mapped = %format!("{width}x{height}"),
                model = %self.config.model_id,
                "Adjusted size for model"
            );
        }

        let body = GenerationRequestBody {
            model: &self.config.model_id,
            public: false,
            parameters: GenerationParameters {
                prompt: &request.prompt,
                width,
                height,
                quantity: 1,
                prompt_enhance: "OFF",
                mode: self.is_gpt_image().then_some("QUALITY"),
                negative_prompt: request.negative_prompt(),
            },
        };

        let response = self
            .client
            .post(format!("{}/v2/generations", self.base_url()))
            .bearer_auth(api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status("Leonardo submit", status, &body));
        }

        let text = response.text().await?;
        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::parse(format!("Invalid Leonardo submit response: {e}"), &text))?;
        generation_id(&payload)
            .ok_or_else(|| ProviderError::parse("Leonardo did not return a generationId", &payload))
    }

    async fn poll_once(
        &self,
        api_key: &str,
        generation_id: &str,
    ) -> Result<PollStatus<String>, ProviderError> {
        let response = match self
            .client
            .get(format!("{}/v1/generations/{generation_id}", self.base_url()))
            .bearer_auth(api_key)
            .timeout(POLL_REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Leonardo poll request failed");
                return Ok(PollStatus::Pending);
            },
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Leonardo poll error");
            return Ok(PollStatus::Pending);
        }

        let record = match response.json::<GenerationRecordResponse>().await {
            Ok(parsed) => parsed.generations_by_pk.and_then(OneOrMany::into_first),
            Err(e) => {
                warn!(error = %e, "Unreadable Leonardo poll response");
                return Ok(PollStatus::Pending);
            },
        };
        let Some(record) = record else {
            warn!("Leonardo poll response missing generations_by_pk");
            return Ok(PollStatus::Pending);
        };

        debug!(status = ?record.status, "Leonardo poll status");
        match record.status {
            Some(GenerationStatus::Complete) => record
                .generated_images
                .into_iter()
                .find_map(|image| image.url)
                .map(PollStatus::Done)
                .ok_or_else(|| {
                    ProviderError::Remote("Leonardo generation completed without images".to_string())
                }),
            Some(GenerationStatus::Failed) => Err(ProviderError::Remote(
                "Leonardo generation status: FAILED".to_string(),
            )),
            Some(GenerationStatus::Pending | GenerationStatus::Unknown) | None => {
                Ok(PollStatus::Pending)
            },
        }
    }
}

fn generation_id(payload: &Value) -> Option<String> {
    let record = match payload {
        Value::Array(items) => items.first()?,
        other => other,
    };
    ["/generationId", "/generate/generationId", "/sdGenerationJob/generationId"]
        .iter()
        .find_map(|pointer| record.pointer(pointer).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
}

#[async_trait]
impl ImageProvider for LeonardoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(model = %self.config.model_id, width = request.width, height = request.height))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes, ProviderError> {
        let api_key = self.api_key()?;

        let generation_id = self.submit(api_key, request).await?;
        info!(generation_id = %generation_id, "Leonardo job submitted");

        let policy = PollPolicy::from_millis(self.config.poll_interval_ms, self.config.poll_timeout_ms);
        let id = generation_id.as_str();
        let image_url = poll_until(&policy, &self.name, move || self.poll_once(api_key, id)).await?;

        info!("Leonardo generation complete, downloading image");
        download(&self.downloads, &image_url).await
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer, model: &str) -> LeonardoConfig {
        LeonardoConfig {
            api_key: Some(SecretString::from("leo-key")),
            base_url: server.uri(),
            model_id: model.to_string(),
            submit_timeout_ms: 5_000,
            poll_interval_ms: 10,
            poll_timeout_ms: 2_000,
        }
    }

    fn provider(config: LeonardoConfig) -> LeonardoProvider {
        LeonardoProvider::new(config, Duration::from_secs(5)).unwrap()
    }

    async fn mount_submit(server: &MockServer, response: Value) {
        Mock::given(method("POST"))
            .and(path("/v2/generations"))
            .and(header("authorization", "Bearer leo-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_image(server: &MockServer) -> String {
        Mock::given(method("GET"))
            .and(path("/images/out.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(server)
            .await;
        format!("{}/images/out.png", server.uri())
    }

    #[test]
    fn name_includes_model() {
        let provider = provider(LeonardoConfig::default());
        assert_eq!(provider.name(), "Leonardo.AI (gpt-image-1.5)");
    }

    #[test]
    fn model_sizes() {
        let gpt = provider(LeonardoConfig::default());
        assert_eq!(gpt.model_size(1024, 680), (1536, 1024));

        let seedream = provider(LeonardoConfig {
            model_id: "seedream-4.5".to_string(),
            ..Default::default()
        });
        assert_eq!(seedream.model_size(2048, 100), (1440, 256));

        let other = provider(LeonardoConfig {
            model_id: "gemini-2.5-flash-image".to_string(),
            ..Default::default()
        });
        assert_eq!(other.model_size(1000, 700), (1000, 700));
    }

    #[test]
    fn generation_id_locations() {
        assert_eq!(generation_id(&json!({"generationId": "a"})).as_deref(), Some("a"));
        assert_eq!(
            generation_id(&json!({"generate": {"generationId": "b"}})).as_deref(),
            Some("b")
        );
        assert_eq!(
            generation_id(&json!([{"sdGenerationJob": {"generationId": "c"}}])).as_deref(),
            Some("c")
        );
        assert_eq!(generation_id(&json!({"nothing": true})), None);
        assert_eq!(generation_id(&json!([])), None);
    }

    #[tokio::test]
    async fn missing_api_key_is_configuration_error() {
        let server = MockServer::start().await;
        let mut config = config(&server, GPT_IMAGE_MODEL);
        config.api_key = None;

        let err = provider(config)
            .generate(&GenerationRequest::new("a red cube", 1024, 680))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submits_polls_and_downloads() {
        let server = MockServer::start().await;
        let image_url = mount_image(&server).await;

        Mock::given(method("POST"))
            .and(path("/v2/generations"))
            .and(body_partial_json(json!({
                "model": "gpt-image-1.5",
                "public": false,
                "parameters": {
                    "prompt": "a red cube",
                    "width": 1536,
                    "height": 1024,
                    "quantity": 1,
                    "prompt_enhance": "OFF",
                    "mode": "QUALITY",
                    "negative_prompt": "blurry"
                }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"generate": {"generationId": "gen-1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/generations/gen-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"generations_by_pk": {"status": "PENDING", "generated_images": []}})),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/generations/gen-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "generations_by_pk": {"status": "COMPLETE", "generated_images": [{"url": image_url}]}
            })))
            .mount(&server)
            .await;

        let request = GenerationRequest::new("a red cube", 1024, 680).with_negative_prompt("blurry");
        let data = provider(config(&server, GPT_IMAGE_MODEL))
            .generate(&request)
            .await
            .unwrap();

        assert_eq!(data.len(), 64);
    }

    #[tokio::test]
    async fn transient_poll_errors_are_retried() {
        let server = MockServer::start().await;
        let image_url = mount_image(&server).await;
        mount_submit(&server, json!({"generationId": "gen-2"})).await;

        Mock::given(method("GET"))
            .and(path("/v1/generations/gen-2"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/generations/gen-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "generations_by_pk": [{"status": "COMPLETE", "generated_images": [{"url": image_url}]}]
            })))
            .mount(&server)
            .await;

        let data = provider(config(&server, "seedream-4.5"))
            .generate(&GenerationRequest::new("a red cube", 1024, 680))
            .await
            .unwrap();
        assert_eq!(data.len(), 64);
    }

    #[tokio::test]
    async fn failed_status_is_terminal() {
        let server = MockServer::start().await;
        mount_submit(&server, json!({"generationId": "gen-3"})).await;

        Mock::given(method("GET"))
            .and(path("/v1/generations/gen-3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"generations_by_pk": {"status": "FAILED"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(config(&server, GPT_IMAGE_MODEL))
            .generate(&GenerationRequest::new("a red cube", 1024, 680))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Leonardo generation status: FAILED");
    }

    #[tokio::test]
    async fn never_completing_generation_times_out() {
        let server = MockServer::start().await;
        mount_submit(&server, json!({"generationId": "gen-4"})).await;

        Mock::given(method("GET"))
            .and(path("/v1/generations/gen-4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"generations_by_pk": {"status": "PENDING"}})),
            )
            .mount(&server)
            .await;

        let mut config = config(&server, GPT_IMAGE_MODEL);
        config.poll_timeout_ms = 100;
        let err = provider(config)
            .generate(&GenerationRequest::new("a red cube", 1024, 680))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn submit_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/generations"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = provider(config(&server, GPT_IMAGE_MODEL))
            .generate(&GenerationRequest::new("a red cube", 1024, 680))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().starts_with("Leonardo submit failed with HTTP 429"));
    }

    #[tokio::test]
    async fn submit_without_generation_id_is_parse_error() {
        let server = MockServer::start().await;
        mount_submit(&server, json!({"error": "odd"})).await;

        let err = provider(config(&server, GPT_IMAGE_MODEL))
            .generate(&GenerationRequest::new("a red cube", 1024, 680))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }
}
