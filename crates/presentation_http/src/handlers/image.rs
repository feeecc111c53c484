//! Image generation handler

use std::{sync::Arc, time::Duration};

use ai_image::GenerationRequest;
use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::{error::ApiError, state::AppState};

/// Header naming the provider that produced the image
pub const PROVIDER_HEADER: &str = "x-image-provider";

const DEFAULT_WIDTH: u32 = 1024;
const DEFAULT_HEIGHT: u32 = 680;

/// Query parameters for `POST /generate`
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    /// What to draw
    pub prompt: Option<String>,
    /// What to avoid; the configured default applies when absent
    pub negative_prompt: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

const fn default_width() -> u32 {
    DEFAULT_WIDTH
}

const fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

/// Generate an image and return it as an attachment
#[instrument(skip(state, params))]
pub async fn generate(
    State(state): State<AppState>,
    params: Result<Query<GenerateParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let prompt = params
        .prompt
        .ok_or_else(|| ApiError::BadRequest("Missing required parameter: prompt".to_string()))?;
    let negative_prompt = params
        .negative_prompt
        .unwrap_or_else(|| state.config.image.default_negative_prompt.clone());

    let request = GenerationRequest::new(prompt, params.width, params.height)
        .with_negative_prompt(negative_prompt);
    // Reject bad parameters before spending any time on providers
    request.validate(state.orchestrator.bounds())?;

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let orchestrator = Arc::clone(&state.orchestrator);
    let job = tokio::spawn(async move { orchestrator.generate(&request).await });

    let image = match tokio::time::timeout(timeout, job).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(ApiError::Internal(format!("Generation task failed: {e}"))),
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Image generation exceeded request timeout");
            return Err(ApiError::GatewayTimeout(format!(
                "No image within {}s",
                timeout.as_secs()
            )));
        },
    };

    info!(
        provider = %image.provider,
        bytes = image.data.len(),
        attempts = image.attempts.len(),
        "Returning generated image"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(image.format.mime_type()),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!(
            "attachment; filename=generated_image.{}",
            image.format.extension()
        ))?,
    );
    headers.insert(
        HeaderName::from_static(PROVIDER_HEADER),
        header_value(&image.provider)?,
    );

    Ok((headers, image.data).into_response())
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Internal(format!("Invalid header value {value:?}: {e}")))
}
