//! Ordered provider fallback
//!
//! Tries providers one at a time in their configured order and returns the
//! first image. Every failure is recorded and the next provider is tried;
//! the caller only sees an error once the list is exhausted.
//!
//! ```text
//! request ──▶ validate ──▶ P1 ──fail──▶ P2 ──fail──▶ ... ──▶ PN ──fail──▶ AllProvidersFailed
//!                           │            │                    │
//!                           ok           ok                   ok
//!                           ▼            ▼                    ▼
//!                                 GeneratedImage
//! ```

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::ImageConfig;
use crate::error::ImageError;
use crate::ports::ImageProvider;
use crate::providers::build_providers;
use crate::types::{AttemptLog, DimensionBounds, GeneratedImage, GenerationRequest, ImageFormat};

/// Sequential fallback over a fixed provider list
pub struct ImageOrchestrator {
    providers: Vec<Arc<dyn ImageProvider>>,
    bounds: DimensionBounds,
}

impl std::fmt::Debug for ImageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageOrchestrator")
            .field("providers", &self.provider_names())
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl ImageOrchestrator {
    /// Create an orchestrator over `providers`, tried in the given order
    ///
    /// # Errors
    ///
    /// Returns `ImageError::Configuration` if the list is empty.
    pub fn new(
        providers: Vec<Arc<dyn ImageProvider>>,
        bounds: DimensionBounds,
    ) -> Result<Self, ImageError> {
        if providers.is_empty() {
            return Err(ImageError::Configuration(
                "At least one image provider must be configured".to_string(),
            ));
        }

        info!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "Image orchestrator initialized"
        );
        Ok(Self { providers, bounds })
    }

    /// Build the orchestrator and its providers from configuration
    ///
    /// # Errors
    ///
    /// Returns `ImageError::Configuration` if the configuration is invalid
    /// or a provider cannot be constructed.
    pub fn from_config(config: &ImageConfig) -> Result<Self, ImageError> {
        config.validate().map_err(ImageError::Configuration)?;
        let providers =
            build_providers(config).map_err(|e| ImageError::Configuration(e.to_string()))?;
        Self::new(providers, config.bounds())
    }

    /// Names of the providers in the order they are tried
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Accepted width/height range
    #[must_use]
    pub const fn bounds(&self) -> DimensionBounds {
        self.bounds
    }

    /// Convenience wrapper around [`generate`](Self::generate)
    ///
    /// # Errors
    ///
    /// See [`generate`](Self::generate).
    pub async fn generate_image(
        &self,
        prompt: &str,
        negative_prompt: &str,
        width: u32,
        height: u32,
    ) -> Result<GeneratedImage, ImageError> {
        let request = GenerationRequest::new(prompt, width, height).with_negative_prompt(negative_prompt);
        self.generate(&request).await
    }

    /// Generate an image, falling back through the providers
    ///
    /// # Errors
    ///
    /// Returns `ImageError::InvalidRequest` before any provider is called when
    /// the request is invalid, and `ImageError::AllProvidersFailed` with the
    /// full attempt log when every provider failed.
    #[instrument(skip(self, request), fields(prompt = %request.prompt_preview(), width = request.width, height = request.height))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ImageError> {
        request.validate(self.bounds)?;

        let mut attempts = AttemptLog::new();
        let total = self.providers.len();

        for (idx, provider) in self.providers.iter().enumerate() {
            let name = provider.name();
            info!(provider = name, attempt = idx + 1, total, "Trying image provider");

            let started = Instant::now();
            match provider.generate(request).await {
                Ok(data) => {
                    let elapsed = started.elapsed();
                    attempts.record_success(name, data.len(), elapsed);
                    info!(
                        provider = name,
                        bytes = data.len(),
                        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "Image generated"
                    );
                    return Ok(GeneratedImage {
                        format: ImageFormat::sniff(&data),
                        data,
                        provider: name.to_string(),
                        attempts,
                    });
                },
                Err(e) => {
                    let elapsed = started.elapsed();
                    warn!(
                        provider = name,
                        kind = %e.kind(),
                        rate_limited = e.is_rate_limited(),
                        error = %e,
                        "Image provider failed, trying next"
                    );
                    attempts.record_failure(name, &e, elapsed);
                },
            }
        }

        error!(attempts = %attempts, "All image providers failed");
        Err(ImageError::AllProvidersFailed(attempts))
    }
}
