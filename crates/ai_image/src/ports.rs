//! Port definitions for image generation
//!
//! Defines the traits (ports) that image generation adapters must implement.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::ProviderError;
use crate::types::GenerationRequest;

/// Port for a single image generation backend
///
/// Implementations are stateless per call: everything they need besides the
/// request comes from configuration handed to their constructor.
///
/// # Example
///
/// ```ignore
/// use ai_image::{GenerationRequest, ImageProvider};
///
/// async fn first_try(provider: &dyn ImageProvider) -> Result<Vec<u8>, ProviderError> {
///     let request = GenerationRequest::new("a red cube", 1024, 680);
///     Ok(provider.generate(&request).await?.to_vec())
/// }
/// ```
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Human readable identity used in logs and error messages
    fn name(&self) -> &str;

    /// Generate one image and return its encoded bytes
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` when the backend is misconfigured, fails,
    /// times out or answers with an unrecognized payload.
    async fn generate(&self, request: &GenerationRequest) -> Result<Bytes, ProviderError>;
}

/// A call to a Gradio Space endpoint
#[derive(Debug, Clone)]
pub struct SpaceCall {
    /// Root URL of the Space
    pub space_url: String,
    /// Endpoint name without the leading slash, e.g. `infer`
    pub api_name: String,
    /// Positional inputs of the endpoint
    pub data: Vec<Value>,
    /// How long to wait for the result once the job is submitted
    pub timeout: Duration,
}

/// Result of a Gradio job
#[derive(Debug, Clone, Default)]
pub struct SpaceOutput {
    /// Positional outputs of the endpoint
    pub data: Vec<Value>,
    /// Local files written while resolving the outputs; the caller owns
    /// their removal
    pub files: Vec<PathBuf>,
}

/// Port for submit-then-wait job backends (Gradio Spaces)
#[async_trait]
pub trait SpaceClient: Send + Sync {
    /// Submit a job and wait up to `call.timeout` for its outputs
    ///
    /// Files referenced by the outputs are downloaded into `scratch` and
    /// reported in `SpaceOutput::files`. On timeout the remote job is simply
    /// abandoned.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Timeout` when no result arrives in time and
    /// `ProviderError::Remote` when the Space reports an error.
    async fn run(&self, call: SpaceCall, scratch: &Path) -> Result<SpaceOutput, ProviderError>;
}
