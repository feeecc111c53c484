//! Image generation errors
//!
//! Two layers: `ProviderError` describes why a single backend attempt failed,
//! `ImageError` is what callers of the orchestrator see.

use std::fmt;

use thiserror::Error;

use crate::types::AttemptLog;

/// Payloads attached to parse errors are cut at this many characters
pub const MAX_PAYLOAD_CHARS: usize = 2000;

/// Coarse classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid setup (credentials, URLs)
    Config,
    /// Backend answered with a failure status or an unusable payload
    Remote,
    /// No result within the provider's budget
    Timeout,
    /// Response shape not recognized
    Parse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Remote => write!(f, "remote"),
            Self::Timeout => write!(f, "timeout"),
            Self::Parse => write!(f, "parse"),
        }
    }
}

/// Failure of a single provider attempt
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// A required credential or setting is missing
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend reported a failure
    #[error("{0}")]
    Remote(String),

    /// The backend did not produce a result in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// The backend answered with a shape we do not understand
    #[error("{message}; payload: {payload}")]
    Parse {
        /// What was expected
        message: String,
        /// Raw payload, truncated to `MAX_PAYLOAD_CHARS`
        payload: String,
    },
}

impl ProviderError {
    /// Build a parse error, keeping the raw payload for debugging
    pub fn parse(message: impl Into<String>, payload: &impl fmt::Display) -> Self {
        Self::Parse {
            message: message.into(),
            payload: truncate(&payload.to_string(), MAX_PAYLOAD_CHARS),
        }
    }

    /// Build a remote error from a non-success HTTP status and body
    pub fn http_status(context: &str, status: reqwest::StatusCode, body: &str) -> Self {
        Self::Remote(format!(
            "{context} failed with HTTP {status}: {}",
            truncate(body.trim(), MAX_PAYLOAD_CHARS)
        ))
    }

    /// Classification used in diagnostics
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Config,
            Self::Remote(_) => ErrorKind::Remote,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// Whether the message looks like a quota or rate limit rejection
    ///
    /// Purely diagnostic, the orchestrator moves on either way.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        let message = self.to_string().to_lowercase();
        ["quota", "429", "rate limit"]
            .iter()
            .any(|needle| message.contains(needle))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Remote(format!("Failed to decode response: {err}"))
        } else {
            Self::Remote(err.to_string())
        }
    }
}

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum ImageError {
    /// The request violates its invariants
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The orchestrator could not be built
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Every configured provider failed
    #[error("All image providers failed: {0}")]
    AllProvidersFailed(AttemptLog),
}

impl ImageError {
    /// True when every attempt ended in a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::AllProvidersFailed(log) => log.all_timed_out(),
            _ => false,
        }
    }
}

pub(crate) fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
