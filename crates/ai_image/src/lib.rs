//! AI Image - text-to-image generation with ordered provider fallback
//!
//! Wraps several independent image generation backends behind one contract
//! and tries them in a fixed order until one produces an image:
//! - Leonardo.AI (submit + poll)
//! - kie.ai Z-Image (create task + poll status)
//! - Hugging Face Spaces over the Gradio API (Qwen-Image, FLUX.2 klein,
//!   Z-Image, Playground v2.5, SDXL-Lightning)
//! - Pixazo Flux Schnell (single call)
//!
//! # Architecture
//!
//! This crate follows the ports & adapters pattern:
//! - `ports` module defines the traits (ports)
//! - `providers` module contains concrete implementations (adapters)
//! - `orchestrator` runs the fallback loop over a list of providers
//!
//! # Example
//!
//! ```ignore
//! use ai_image::{ImageConfig, ImageOrchestrator};
//!
//! let orchestrator = ImageOrchestrator::from_config(&ImageConfig::default())?;
//!
//! let image = orchestrator
//!     .generate_image("a red cube on a white table", "", 1024, 680)
//!     .await?;
//! println!("{} bytes from {}", image.data.len(), image.provider);
//! ```

pub mod config;
pub mod error;
pub mod gradio;
pub mod mapping;
pub mod orchestrator;
pub mod output;
pub mod polling;
pub mod ports;
pub mod providers;
pub mod types;

pub use config::{ImageConfig, ProviderKind};
pub use error::{ErrorKind, ImageError, ProviderError};
pub use gradio::GradioClient;
pub use orchestrator::ImageOrchestrator;
pub use ports::{ImageProvider, SpaceCall, SpaceClient, SpaceOutput};
pub use types::{
    Attempt, AttemptLog, AttemptOutcome, DimensionBounds, GeneratedImage, GenerationRequest,
    ImageFormat,
};
