//! Configuration for image generation
//!
//! Everything backend specific (URLs, model ids, budgets, credentials) lives
//! here so providers can be added, removed or re-pointed without touching the
//! orchestrator.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::types::DimensionBounds;

/// Image generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Smallest accepted width/height
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,

    /// Largest accepted width/height
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Negative prompt used by the HTTP boundary when none is given
    #[serde(default = "default_negative_prompt")]
    pub default_negative_prompt: String,

    /// Providers in the order they are tried
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderKind>,

    /// Parent directory for request-scoped scratch directories
    /// (system temp dir when unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Timeout for downloading a finished image from a result URL
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,

    /// Hugging Face Spaces (Gradio backends)
    #[serde(default)]
    pub huggingface: HuggingFaceConfig,

    /// Leonardo.AI
    #[serde(default)]
    pub leonardo: LeonardoConfig,

    /// Pixazo gateway
    #[serde(default)]
    pub pixazo: PixazoConfig,

    /// kie.ai task API
    #[serde(default)]
    pub kieai: KieAiConfig,
}

/// Provider selection, in configuration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Leonardo.AI generations API
    Leonardo,
    /// Z-Image served through kie.ai tasks
    KieaiZImage,
    /// Qwen-Image Space
    Qwen,
    /// FLUX.2 klein Space
    FluxKlein,
    /// Tongyi-MAI Z-Image Space
    ZImage,
    /// Playground v2.5 Space
    Playground,
    /// SDXL-Lightning real-time Space
    Radames,
    /// Pixazo Flux Schnell gateway
    Pixazo,
}

/// A single Gradio Space endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    /// Root URL of the Space
    pub url: String,

    /// How long to wait for the job result
    #[serde(default = "default_space_timeout_ms")]
    pub timeout_ms: u64,
}

impl SpaceConfig {
    fn new(url: &str, timeout_ms: u64) -> Self {
        Self {
            url: url.to_string(),
            timeout_ms,
        }
    }

    /// Result timeout as a `Duration`
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Hugging Face Spaces configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceConfig {
    /// Optional token; Spaces are public but a token raises quotas
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    /// Playground v2.5
    #[serde(default = "default_playground_space")]
    pub playground: SpaceConfig,

    /// SDXL-Lightning real-time
    #[serde(default = "default_radames_space")]
    pub radames: SpaceConfig,

    /// Qwen-Image
    #[serde(default = "default_qwen_space")]
    pub qwen: SpaceConfig,

    /// Tongyi-MAI Z-Image
    #[serde(default = "default_z_image_space")]
    pub z_image: SpaceConfig,

    /// FLUX.2 klein
    #[serde(default = "default_flux_klein_space")]
    pub flux_klein: SpaceConfig,
}

/// Leonardo.AI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeonardoConfig {
    /// API key (required)
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// REST root, versions are appended per endpoint
    #[serde(default = "default_leonardo_base_url")]
    pub base_url: String,

    /// Model identifier, e.g. `gpt-image-1.5`, `seedream-4.5`
    #[serde(default = "default_leonardo_model")]
    pub model_id: String,

    /// Timeout for the submit call
    #[serde(default = "default_leonardo_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Delay between status polls
    #[serde(default = "default_leonardo_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall polling budget
    #[serde(default = "default_leonardo_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

/// Pixazo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixazoConfig {
    /// Subscription key (required)
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// Full endpoint URL
    #[serde(default = "default_pixazo_url")]
    pub url: String,

    /// Timeout for the generation call
    #[serde(default = "default_pixazo_timeout_ms")]
    pub timeout_ms: u64,
}

/// kie.ai configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KieAiConfig {
    /// API key (required)
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// API root
    #[serde(default = "default_kieai_base_url")]
    pub base_url: String,

    /// Model name for Z-Image tasks
    #[serde(default = "default_kieai_z_image_model")]
    pub z_image_model: String,

    /// Timeout for create and poll calls
    #[serde(default = "default_kieai_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Delay between status polls
    #[serde(default = "default_kieai_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall polling budget
    #[serde(default = "default_kieai_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

const fn default_min_dimension() -> u32 {
    256
}

const fn default_max_dimension() -> u32 {
    2048
}

fn default_negative_prompt() -> String {
    "cartoon, anime, comic, sketch, drawing, painting, vector art, 3d render, plastic, \
     low quality, worst quality, lowres, blurry, out of focus, bad anatomy, bad hands, \
     missing fingers, extra digit, fewer digits, cropped, signature, watermark, username, \
     text, error, disfigured, ugly, mutation, deformed, glitched, artifacts, tiling, \
     poorly drawn face, bad proportions, malformed limbs, extra arms, extra legs, \
     fused fingers, too many fingers, long neck"
        .to_string()
}

fn default_providers() -> Vec<ProviderKind> {
    vec![
        ProviderKind::Leonardo,
        ProviderKind::KieaiZImage,
        ProviderKind::Qwen,
        ProviderKind::FluxKlein,
        ProviderKind::ZImage,
        ProviderKind::Playground,
        ProviderKind::Radames,
        ProviderKind::Pixazo,
    ]
}

const fn default_download_timeout_ms() -> u64 {
    60_000
}

const fn default_space_timeout_ms() -> u64 {
    120_000
}

fn default_playground_space() -> SpaceConfig {
    SpaceConfig::new("https://playgroundai-playground-v2-5.hf.space", 45_000)
}

fn default_radames_space() -> SpaceConfig {
    SpaceConfig::new(
        "https://radames-real-time-text-to-image-sdxl-lightning.hf.space",
        15_000,
    )
}

fn default_qwen_space() -> SpaceConfig {
    SpaceConfig::new("https://qwen-qwen-image-2512.hf.space", default_space_timeout_ms())
}

fn default_z_image_space() -> SpaceConfig {
    SpaceConfig::new("https://tongyi-mai-z-image.hf.space", default_space_timeout_ms())
}

fn default_flux_klein_space() -> SpaceConfig {
    SpaceConfig::new(
        "https://black-forest-labs-flux-2-klein-9b.hf.space",
        default_space_timeout_ms(),
    )
}

fn default_leonardo_base_url() -> String {
    "https://cloud.leonardo.ai/api/rest".to_string()
}

fn default_leonardo_model() -> String {
    "gpt-image-1.5".to_string()
}

const fn default_leonardo_submit_timeout_ms() -> u64 {
    60_000
}

const fn default_leonardo_poll_interval_ms() -> u64 {
    2_000
}

const fn default_leonardo_poll_timeout_ms() -> u64 {
    90_000
}

fn default_pixazo_url() -> String {
    "https://gateway.pixazo.ai/flux-1-schnell/v1/getData".to_string()
}

const fn default_pixazo_timeout_ms() -> u64 {
    60_000
}

fn default_kieai_base_url() -> String {
    "https://api.kie.ai".to_string()
}

fn default_kieai_z_image_model() -> String {
    "z-image".to_string()
}

const fn default_kieai_request_timeout_ms() -> u64 {
    30_000
}

const fn default_kieai_poll_interval_ms() -> u64 {
    3_000
}

const fn default_kieai_poll_timeout_ms() -> u64 {
    120_000
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            token: None,
            playground: default_playground_space(),
            radames: default_radames_space(),
            qwen: default_qwen_space(),
            z_image: default_z_image_space(),
            flux_klein: default_flux_klein_space(),
        }
    }
}

impl Default for LeonardoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_leonardo_base_url(),
            model_id: default_leonardo_model(),
            submit_timeout_ms: default_leonardo_submit_timeout_ms(),
            poll_interval_ms: default_leonardo_poll_interval_ms(),
            poll_timeout_ms: default_leonardo_poll_timeout_ms(),
        }
    }
}

impl Default for PixazoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: default_pixazo_url(),
            timeout_ms: default_pixazo_timeout_ms(),
        }
    }
}

impl Default for KieAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_kieai_base_url(),
            z_image_model: default_kieai_z_image_model(),
            request_timeout_ms: default_kieai_request_timeout_ms(),
            poll_interval_ms: default_kieai_poll_interval_ms(),
            poll_timeout_ms: default_kieai_poll_timeout_ms(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            min_dimension: default_min_dimension(),
            max_dimension: default_max_dimension(),
            default_negative_prompt: default_negative_prompt(),
            providers: default_providers(),
            scratch_dir: None,
            download_timeout_ms: default_download_timeout_ms(),
            huggingface: HuggingFaceConfig::default(),
            leonardo: LeonardoConfig::default(),
            pixazo: PixazoConfig::default(),
            kieai: KieAiConfig::default(),
        }
    }
}

impl ImageConfig {
    /// Accepted width/height range
    #[must_use]
    pub const fn bounds(&self) -> DimensionBounds {
        DimensionBounds {
            min: self.min_dimension,
            max: self.max_dimension,
        }
    }

    /// Validate the configuration
    ///
    /// Missing credentials are not an error here: the affected provider
    /// fails its own attempts and the orchestrator moves on.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_dimension == 0 {
            return Err("min_dimension must be greater than 0".to_string());
        }
        if self.min_dimension > self.max_dimension {
            return Err(format!(
                "min_dimension ({}) must not exceed max_dimension ({})",
                self.min_dimension, self.max_dimension
            ));
        }
        if self.providers.is_empty() {
            return Err("At least one image provider must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for kind in &self.providers {
            if !seen.insert(kind) {
                return Err(format!("Provider {kind:?} is listed more than once"));
            }
        }

        let budgets = [
            ("download_timeout_ms", self.download_timeout_ms),
            ("huggingface.playground.timeout_ms", self.huggingface.playground.timeout_ms),
            ("huggingface.radames.timeout_ms", self.huggingface.radames.timeout_ms),
            ("huggingface.qwen.timeout_ms", self.huggingface.qwen.timeout_ms),
            ("huggingface.z_image.timeout_ms", self.huggingface.z_image.timeout_ms),
            ("huggingface.flux_klein.timeout_ms", self.huggingface.flux_klein.timeout_ms),
            ("leonardo.submit_timeout_ms", self.leonardo.submit_timeout_ms),
            ("leonardo.poll_interval_ms", self.leonardo.poll_interval_ms),
            ("leonardo.poll_timeout_ms", self.leonardo.poll_timeout_ms),
            ("pixazo.timeout_ms", self.pixazo.timeout_ms),
            ("kieai.request_timeout_ms", self.kieai.request_timeout_ms),
            ("kieai.poll_interval_ms", self.kieai.poll_interval_ms),
            ("kieai.poll_timeout_ms", self.kieai.poll_timeout_ms),
        ];
        if let Some((name, _)) = budgets.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{name} must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = ImageConfig::default();

        assert_eq!(config.min_dimension, 256);
        assert_eq!(config.max_dimension, 2048);
        assert_eq!(config.providers.len(), 8);
        assert_eq!(config.providers[0], ProviderKind::Leonardo);
        assert_eq!(config.providers[7], ProviderKind::Pixazo);
        assert_eq!(config.huggingface.playground.timeout_ms, 45_000);
        assert_eq!(config.huggingface.radames.timeout_ms, 15_000);
        assert_eq!(config.leonardo.model_id, "gpt-image-1.5");
        assert_eq!(config.leonardo.poll_timeout_ms, 90_000);
        assert_eq!(config.kieai.poll_interval_ms, 3_000);
        assert_eq!(config.kieai.poll_timeout_ms, 120_000);
        assert!(config.leonardo.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_provider_list() {
        let config = ImageConfig {
            providers: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_providers() {
        let config = ImageConfig {
            providers: vec![ProviderKind::Qwen, ProviderKind::Pixazo, ProviderKind::Qwen],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("Qwen"));
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let config = ImageConfig {
            min_dimension: 1024,
            max_dimension: 512,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let mut config = ImageConfig::default();
        config.kieai.poll_interval_ms = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            "kieai.poll_interval_ms must be greater than 0"
        );
    }

    #[test]
    fn provider_kind_serializes_snake_case() {
        let kieai = serde_json::to_string(&ProviderKind::KieaiZImage).unwrap();
        let flux = serde_json::to_string(&ProviderKind::FluxKlein).unwrap();
        let z_image = serde_json::to_string(&ProviderKind::ZImage).unwrap();

        assert_eq!(kieai, "\"kieai_z_image\"");
        assert_eq!(flux, "\"flux_klein\"");
        assert_eq!(z_image, "\"z_image\"");
    }

    #[test]
    fn config_deserializes_from_toml() {
        let toml = r#"
            min_dimension = 512
            providers = ["pixazo", "qwen"]

            [huggingface]
            token = "hf_test"

            [huggingface.qwen]
            url = "http://localhost:7860"
            timeout_ms = 5000

            [leonardo]
            api_key = "leo-key"
            model_id = "seedream-4.5"
        "#;

        let config: ImageConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.min_dimension, 512);
        assert_eq!(config.max_dimension, 2048);
        assert_eq!(config.providers, vec![ProviderKind::Pixazo, ProviderKind::Qwen]);
        assert_eq!(
            config.huggingface.token.as_ref().map(ExposeSecret::expose_secret),
            Some("hf_test")
        );
        assert_eq!(config.huggingface.qwen.url, "http://localhost:7860");
        assert_eq!(config.huggingface.qwen.timeout(), Duration::from_secs(5));
        assert_eq!(
            config.huggingface.playground.url,
            "https://playgroundai-playground-v2-5.hf.space"
        );
        assert_eq!(config.leonardo.model_id, "seedream-4.5");
        assert_eq!(config.leonardo.poll_interval_ms, 2_000);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result: Result<ImageConfig, _> = toml::from_str(r#"providers = ["dalle"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = ImageConfig::default();
        config.pixazo.api_key = Some(SecretString::from("super-secret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
