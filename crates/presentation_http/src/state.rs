//! Application state shared across handlers

use std::sync::Arc;

use ai_image::ImageOrchestrator;

use crate::config::AppConfig;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Provider fallback chain
    pub orchestrator: Arc<ImageOrchestrator>,
    /// Application configuration
    pub config: Arc<AppConfig>,
}
