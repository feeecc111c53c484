//! Image generation HTTP presentation layer
//!
//! Exposes the provider fallback chain as `POST /generate`, plus an open
//! `GET /health` endpoint.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::ApiError;
pub use middleware::ApiKeyAuthLayer;
pub use routes::create_router;
pub use state::AppState;
