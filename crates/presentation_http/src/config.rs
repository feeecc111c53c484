//! Server configuration
//!
//! Layered as: built-in defaults, then an optional `config.toml` in the
//! working directory, then `IMAGEGEN__SECTION__FIELD` environment variables.
//! The flat credential variables used by existing deployments (`HF_TOKEN`,
//! `LEONARDO_API_KEY`, ...) are applied last.

use ai_image::ImageConfig;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Inbound authentication
    #[serde(default)]
    pub security: SecurityConfig,

    /// Image generation and provider settings
    #[serde(default)]
    pub image: ImageConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log format: "json" for structured JSON logs, "text" for human-readable
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Upper bound for a whole `/generate` call, across all providers
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Security configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Expected `X-Token` value; authentication is disabled when unset
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_log_format() -> String {
    "text".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    600
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_format: default_log_format(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, environment and legacy variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            // Load from file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (e.g., IMAGEGEN__SERVER__PORT)
            .add_source(
                config::Environment::with_prefix("IMAGEGEN")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut app_config: Self = builder.build()?.try_deserialize()?;
        app_config.apply_legacy_env(|name| std::env::var(name).ok());
        app_config.validate().map_err(config::ConfigError::Message)?;
        Ok(app_config)
    }

    /// Apply the flat credential variables older deployments rely on
    ///
    /// Empty values are ignored.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(token) = get("HF_TOKEN") {
            self.image.huggingface.token = Some(SecretString::from(token));
        }
        if let Some(url) = get("HF_URL") {
            self.image.huggingface.playground.url = url;
        }
        if let Some(key) = get("LEONARDO_API_KEY") {
            self.image.leonardo.api_key = Some(SecretString::from(key));
        }
        if let Some(model) = get("LEONARDO_MODEL_ID") {
            self.image.leonardo.model_id = model;
        }
        if let Some(key) = get("API_KEY_PIXAZO") {
            self.image.pixazo.api_key = Some(SecretString::from(key));
        }
        if let Some(url) = get("URL_PIXAZO") {
            self.image.pixazo.url = url;
        }
        if let Some(key) = get("KIEAI_API_KEY") {
            self.image.kieai.api_key = Some(SecretString::from(key));
        }
        if let Some(key) = get("API_KEY") {
            self.security.api_key = Some(SecretString::from(key));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.server.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "server.log_format must be \"text\" or \"json\", got \"{}\"",
                self.server.log_format
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err("server.request_timeout_secs must be greater than 0".to_string());
        }
        self.image.validate()
    }
}
