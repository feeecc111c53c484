//! Hugging Face Space providers
//!
//! Five public Gradio Spaces, each with its own endpoint, input list and
//! output shape. They share the job plumbing: a fresh scratch directory per
//! call, a `SpaceClient` job, shape-driven output parsing and unconditional
//! removal of every local file the job produced.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use reqwest::Client;
use serde_json::{Value, json};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

use super::http_client;
use crate::config::{HuggingFaceConfig, SpaceConfig};
use crate::error::ProviderError;
use crate::mapping::{
    FLUX_KLEIN_DIMENSIONS, QWEN_ASPECT_RATIOS, Z_IMAGE_RESOLUTIONS, nearest_aspect_ratio,
};
use crate::output::{Artifacts, OutputShape, extract_artifact, load_artifact};
use crate::ports::{ImageProvider, SpaceCall, SpaceClient};
use crate::types::GenerationRequest;

/// Largest seed accepted by the SDXL-Lightning Space
const RADAMES_MAX_SEED: u32 = 2_147_483_647;

/// The supported Spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceModel {
    /// Qwen-Image 2512
    Qwen,
    /// FLUX.2 klein 9B, distilled mode
    FluxKlein,
    /// Tongyi-MAI Z-Image
    ZImage,
    /// Playground v2.5
    Playground,
    /// SDXL-Lightning real-time
    Radames,
}

impl SpaceModel {
    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Qwen => "Qwen-Image (Alibaba Cloud)",
            Self::FluxKlein => "Flux.2 Klein (9B Distilled)",
            Self::ZImage => "Z-Image (Tongyi-MAI)",
            Self::Playground => "Hugging Face (Playground v2.5)",
            Self::Radames => "Radames SDXL-Lightning (Real-Time)",
        }
    }

    /// Gradio endpoint name
    #[must_use]
    pub const fn api_name(self) -> &'static str {
        match self {
            Self::Qwen => "infer",
            Self::FluxKlein | Self::ZImage => "generate",
            Self::Playground => "run",
            Self::Radames => "predict",
        }
    }

    /// Accepted shapes of the first output, most likely first
    #[must_use]
    pub const fn output_shapes(self) -> &'static [OutputShape] {
        match self {
            Self::Qwen => &[
                OutputShape::PlainPath,
                OutputShape::PathField,
                OutputShape::UrlField,
            ],
            Self::FluxKlein => &[
                OutputShape::PathField,
                OutputShape::UrlField,
                OutputShape::PlainPath,
            ],
            Self::ZImage => &[OutputShape::Gallery],
            Self::Playground => &[OutputShape::Gallery, OutputShape::PlainPath],
            Self::Radames => &[
                OutputShape::PlainPath,
                OutputShape::ImageField,
                OutputShape::PathField,
            ],
        }
    }

    /// Whether the Space takes a negative prompt
    #[must_use]
    pub const fn uses_negative_prompt(self) -> bool {
        matches!(self, Self::ZImage | Self::Playground)
    }

    /// Endpoint configuration for this Space
    #[must_use]
    pub const fn space_config(self, config: &HuggingFaceConfig) -> &SpaceConfig {
        match self {
            Self::Qwen => &config.qwen,
            Self::FluxKlein => &config.flux_klein,
            Self::ZImage => &config.z_image,
            Self::Playground => &config.playground,
            Self::Radames => &config.radames,
        }
    }

    /// Positional endpoint inputs for a request
    #[must_use]
    pub fn inputs(self, request: &GenerationRequest) -> Vec<Value> {
        let prompt = request.prompt.as_str();
        let negative = request.negative_prompt().unwrap_or_default();

        match self {
            Self::Qwen => {
                let bucket = nearest_aspect_ratio(QWEN_ASPECT_RATIOS, request.width, request.height);
                // prompt, seed, randomize seed, aspect ratio, guidance, steps, prompt enhance
                vec![
                    json!(prompt),
                    json!(0),
                    json!(true),
                    json!(bucket.label),
                    json!(4.0),
                    json!(50),
                    json!(true),
                ]
            },
            Self::FluxKlein => {
                let (width, height) = FLUX_KLEIN_DIMENSIONS.apply_pair(request.width, request.height);
                // prompt, input images, mode, seed, randomize seed, width, height, steps, guidance, upsampling
                vec![
                    json!(prompt),
                    json!([]),
                    json!("Distilled (4 steps)"),
                    json!(0),
                    json!(true),
                    json!(width),
                    json!(height),
                    json!(4),
                    json!(3.5),
                    json!(false),
                ]
            },
            Self::ZImage => {
                let bucket = nearest_aspect_ratio(Z_IMAGE_RESOLUTIONS, request.width, request.height);
                let resolution = format!("{}x{} ( {} )", bucket.width, bucket.height, bucket.label);
                // prompt, negative, resolution, seed, steps, shift, random seed, ..., gallery
                vec![
                    json!(prompt),
                    json!(negative),
                    json!(resolution),
                    json!(0),
                    json!(30),
                    json!(4.0),
                    json!(false),
                    json!(true),
                    json!([]),
                ]
            },
            Self::Playground => vec![
                json!(prompt),
                json!(negative),
                json!(true),
                json!(0),
                json!(request.width),
                json!(request.height),
                json!(3),
                json!(true),
            ],
            Self::Radames => {
                let seed = rand::rng().random_range(0..=RADAMES_MAX_SEED);
                vec![json!(prompt), json!(seed)]
            },
        }
    }
}

/// Image provider backed by a Gradio Space
pub struct SpaceProvider {
    model: SpaceModel,
    space: SpaceConfig,
    client: Arc<dyn SpaceClient>,
    scratch_root: Option<PathBuf>,
    downloads: Client,
}

impl std::fmt::Debug for SpaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceProvider")
            .field("model", &self.model)
            .field("space", &self.space)
            .field("scratch_root", &self.scratch_root)
            .finish_non_exhaustive()
    }
}

impl SpaceProvider {
    /// Create a provider for `model` served at `space`
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if the download client cannot
    /// be built.
    pub fn new(
        model: SpaceModel,
        space: SpaceConfig,
        client: Arc<dyn SpaceClient>,
        scratch_root: Option<PathBuf>,
        download_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            model,
            space,
            client,
            scratch_root,
            downloads: http_client(download_timeout)?,
        })
    }

    /// Which Space this provider talks to
    #[must_use]
    pub const fn model(&self) -> SpaceModel {
        self.model
    }

    fn scratch_dir(&self) -> Result<TempDir, ProviderError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("imagegen-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|e| ProviderError::Configuration(format!("Failed to create scratch directory: {e}")))
    }
}

#[async_trait]
impl ImageProvider for SpaceProvider {
    fn name(&self) -> &str {
        self.model.name()
    }

    #[instrument(skip(self, request), fields(provider = self.model.name(), width = request.width, height = request.height))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes, ProviderError> {
        let scratch = self.scratch_dir()?;
        let call = SpaceCall {
            space_url: self.space.url.clone(),
            api_name: self.model.api_name().to_string(),
            data: self.model.inputs(request),
            timeout: self.space.timeout(),
        };

        info!(
            space = %call.space_url,
            api = %call.api_name,
            timeout_secs = call.timeout.as_secs(),
            negative_prompt = self.model.uses_negative_prompt() && request.negative_prompt().is_some(),
            "Submitting Space job"
        );

        let output = self.client.run(call, scratch.path()).await?;

        // Declared after `scratch` so the files go before the directory.
        // Only files the client wrote for this call may be read.
        let mut artifacts = Artifacts::new();
        artifacts.track(output.files.iter().cloned());

        let artifact = extract_artifact(self.model.name(), &output.data, self.model.output_shapes())?;
        debug!(artifact = ?artifact, "Resolved Space output");

        let data = load_artifact(&self.downloads, artifact, &artifacts).await?;
        info!(bytes = data.len(), "Space image received");
        Ok(data)
    }
}
