//! Image generation provider implementations
//!
//! Contains the concrete `ImageProvider` adapters and the registry that turns
//! the configured provider ordering into a list of adapters.

pub mod kieai;
pub mod leonardo;
pub mod pixazo;
pub mod spaces;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

pub use kieai::KieAiZImageProvider;
pub use leonardo::LeonardoProvider;
pub use pixazo::PixazoProvider;
pub use spaces::{SpaceModel, SpaceProvider};

use crate::config::{ImageConfig, ProviderKind};
use crate::error::ProviderError;
use crate::gradio::GradioClient;
use crate::ports::{ImageProvider, SpaceClient};

/// Build the providers listed in `config.providers`, in order
///
/// Gradio Spaces share one [`GradioClient`] carrying the optional Hugging
/// Face token.
///
/// # Errors
///
/// Returns `ProviderError::Configuration` if an HTTP client cannot be built.
pub fn build_providers(config: &ImageConfig) -> Result<Vec<Arc<dyn ImageProvider>>, ProviderError> {
    let gradio = GradioClient::new(
        config.huggingface.token.clone(),
        Duration::from_millis(config.download_timeout_ms),
    )?;
    build_providers_with(config, Arc::new(gradio))
}

/// Build the configured providers with a caller supplied Space client
///
/// # Errors
///
/// Returns `ProviderError::Configuration` if an HTTP client cannot be built.
pub fn build_providers_with(
    config: &ImageConfig,
    space_client: Arc<dyn SpaceClient>,
) -> Result<Vec<Arc<dyn ImageProvider>>, ProviderError> {
    let download_timeout = Duration::from_millis(config.download_timeout_ms);
    let space = |model: SpaceModel| -> Result<Arc<dyn ImageProvider>, ProviderError> {
        Ok(Arc::new(SpaceProvider::new(
            model,
            model.space_config(&config.huggingface).clone(),
            Arc::clone(&space_client),
            config.scratch_dir.clone(),
            download_timeout,
        )?))
    };

    config
        .providers
        .iter()
        .map(|kind| -> Result<Arc<dyn ImageProvider>, ProviderError> {
            match kind {
                ProviderKind::Leonardo => Ok(Arc::new(LeonardoProvider::new(
                    config.leonardo.clone(),
                    download_timeout,
                )?)),
                ProviderKind::KieaiZImage => Ok(Arc::new(KieAiZImageProvider::new(
                    config.kieai.clone(),
                    download_timeout,
                )?)),
                ProviderKind::Pixazo => Ok(Arc::new(PixazoProvider::new(
                    config.pixazo.clone(),
                    download_timeout,
                )?)),
                ProviderKind::Qwen => space(SpaceModel::Qwen),
                ProviderKind::FluxKlein => space(SpaceModel::FluxKlein),
                ProviderKind::ZImage => space(SpaceModel::ZImage),
                ProviderKind::Playground => space(SpaceModel::Playground),
                ProviderKind::Radames => space(SpaceModel::Radames),
            }
        })
        .collect()
}

/// Build an HTTP client with a total request timeout
pub(crate) fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {e}")))
}

/// Fetch a finished image from its result URL
pub(crate) async fn download(client: &Client, url: &str) -> Result<Bytes, ProviderError> {
    debug!(url = %url, "Downloading image");
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::http_status("Image download", status, &body));
    }

    let data = response.bytes().await?;
    if data.is_empty() {
        return Err(ProviderError::Remote(format!(
            "Image download from {url} returned an empty body"
        )));
    }
    Ok(data)
}
