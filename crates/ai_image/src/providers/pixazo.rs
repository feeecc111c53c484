//! Pixazo provider (Flux Schnell gateway)
//!
//! One synchronous call returns `{"output": "<url>"}`; the image is then
//! downloaded from that URL.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{download, http_client};
use crate::config::PixazoConfig;
use crate::error::ProviderError;
use crate::ports::ImageProvider;
use crate::types::GenerationRequest;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Pixazo Flux Schnell provider
#[derive(Debug, Clone)]
pub struct PixazoProvider {
    client: Client,
    downloads: Client,
    config: PixazoConfig,
}

#[derive(Debug, Serialize)]
struct PixazoRequest<'a> {
    prompt: &'a str,
    num_steps: u32,
    seed: u32,
    height: u32,
    width: u32,
}

#[derive(Debug, Deserialize)]
struct PixazoResponse {
    #[serde(default)]
    output: Option<String>,
}

impl PixazoProvider {
    /// Display name
    pub const NAME: &'static str = "Pixazo (Flux Schnell)";

    /// Create a new Pixazo provider
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if an HTTP client cannot be
    /// built.
    pub fn new(config: PixazoConfig, download_timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(Duration::from_millis(config.timeout_ms))?,
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
            .ok_or_else(|| ProviderError::Configuration("API_KEY_PIXAZO not set".to_string()))
    }
}

#[async_trait]
impl ImageProvider for PixazoProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self, request), fields(width = request.width, height = request.height))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes, ProviderError> {
        let api_key = self.api_key()?;
        let seed = rand::rng().random_range(1..=9_999_999);
        debug!(seed, steps = 4, "Sending Pixazo request");

        let response = self
            .client
            .post(&self.config.url)
            .header(SUBSCRIPTION_KEY_HEADER, api_key)
            .header("Cache-Control", "no-cache")
            .json(&PixazoRequest {
                prompt: &request.prompt,
                num_steps: 4,
                seed,
                height: request.height,
                width: request.width,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status("Pixazo request", status, &body));
        }

        let text = response.text().await?;
        let parsed: PixazoResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::parse(format!("Invalid Pixazo response: {e}"), &text))?;
        let image_url = parsed
            .output
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ProviderError::parse("No output URL in Pixazo response", &text))?;

        info!("Pixazo image ready, downloading");
        download(&self.downloads, &image_url).await
    }
}
