//! Types for image generation
//!
//! Contains the request passed to providers, the attempt log collected by the
//! orchestrator and the final generated image.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ImageError, ProviderError};

/// Inclusive bounds for requested width and height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionBounds {
    /// Smallest accepted edge in pixels
    pub min: u32,
    /// Largest accepted edge in pixels
    pub max: u32,
}

impl Default for DimensionBounds {
    fn default() -> Self {
        Self { min: 256, max: 2048 }
    }
}

/// A single image generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// What the image should show
    pub prompt: String,
    /// What the image should avoid; empty when unused
    pub negative_prompt: String,
    /// Requested width in pixels
    pub width: u32,
    /// Requested height in pixels
    pub height: u32,
}

impl GenerationRequest {
    /// Create a request without a negative prompt
    pub fn new(prompt: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: String::new(),
            width,
            height,
        }
    }

    /// Attach a negative prompt
    #[must_use]
    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    /// Negative prompt, or `None` when it is blank
    #[must_use]
    pub fn negative_prompt(&self) -> Option<&str> {
        let trimmed = self.negative_prompt.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Width divided by height
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }

    /// Short prefix of the prompt for log lines
    #[must_use]
    pub fn prompt_preview(&self) -> String {
        self.prompt.chars().take(50).collect()
    }

    /// Check the request invariants
    ///
    /// # Errors
    ///
    /// Returns `ImageError::InvalidRequest` for a blank prompt or a dimension
    /// outside `bounds`.
    pub fn validate(&self, bounds: DimensionBounds) -> Result<(), ImageError> {
        if self.prompt.trim().is_empty() {
            return Err(ImageError::InvalidRequest(
                "Prompt cannot be empty".to_string(),
            ));
        }
        for (label, value) in [("width", self.width), ("height", self.height)] {
            if !(bounds.min..=bounds.max).contains(&value) {
                return Err(ImageError::InvalidRequest(format!(
                    "{label} must be between {} and {}, got {value}",
                    bounds.min, bounds.max
                )));
            }
        }
        Ok(())
    }
}

/// Encoded image formats recognised from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG
    Png,
    /// JPEG
    Jpeg,
    /// WebP
    Webp,
}

impl ImageFormat {
    /// Detect the format, falling back to PNG when the bytes are unknown
    #[must_use]
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Self::Webp
        } else {
            Self::Png
        }
    }

    /// MIME type for HTTP responses
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    /// File extension without the dot
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

/// How one provider attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The provider returned an image of this many bytes
    Succeeded {
        /// Size of the returned image
        bytes: usize,
    },
    /// The provider failed
    Failed {
        /// Failure class
        kind: ErrorKind,
        /// Provider error message
        message: String,
        /// Whether the message looks like a quota/rate limit rejection
        rate_limited: bool,
    },
}

/// One entry of the attempt log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Display name of the provider
    pub provider: String,
    /// Result of the attempt
    pub outcome: AttemptOutcome,
    /// Wall-clock time spent in the provider
    pub elapsed: Duration,
}

impl Attempt {
    /// Whether the attempt produced an image
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded { .. })
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Succeeded { bytes } => {
                write!(f, "{}: ok ({bytes} bytes)", self.provider)
            },
            AttemptOutcome::Failed { message, .. } => write!(f, "{}: {message}", self.provider),
        }
    }
}

/// Ordered record of the providers tried during one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptLog {
    attempts: Vec<Attempt>,
}

impl AttemptLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful attempt
    pub fn record_success(&mut self, provider: &str, bytes: usize, elapsed: Duration) {
        self.attempts.push(Attempt {
            provider: provider.to_string(),
            outcome: AttemptOutcome::Succeeded { bytes },
            elapsed,
        });
    }

    /// Record a failed attempt
    pub fn record_failure(&mut self, provider: &str, error: &ProviderError, elapsed: Duration) {
        self.attempts.push(Attempt {
            provider: provider.to_string(),
            outcome: AttemptOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
                rate_limited: error.is_rate_limited(),
            },
            elapsed,
        });
    }

    /// All attempts in order
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Number of attempts
    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// True when nothing was attempted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// True when there was at least one attempt and all of them timed out
    #[must_use]
    pub fn all_timed_out(&self) -> bool {
        !self.attempts.is_empty()
            && self.attempts.iter().all(|attempt| {
                matches!(
                    attempt.outcome,
                    AttemptOutcome::Failed {
                        kind: ErrorKind::Timeout,
                        ..
                    }
                )
            })
    }
}

impl fmt::Display for AttemptLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, attempt) in self.attempts.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{attempt}")?;
        }
        Ok(())
    }
}

/// Image returned by the orchestrator
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Encoded image bytes as returned by the backend
    pub data: Bytes,
    /// Format detected from the bytes
    pub format: ImageFormat,
    /// Name of the provider that produced the image
    pub provider: String,
    /// Every attempt made, the last one being the success
    pub attempts: AttemptLog,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_prompt_blank_is_none() {
        let request = GenerationRequest::new("cat", 512, 512).with_negative_prompt("   ");
        assert_eq!(request.negative_prompt(), None);

        let request = request.with_negative_prompt(" blurry ");
        assert_eq!(request.negative_prompt(), Some("blurry"));
    }

    #[test]
    fn validate_accepts_in_range_request() {
        let request = GenerationRequest::new("a red cube", 1024, 680);
        assert!(request.validate(DimensionBounds::default()).is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_dimensions() {
        let bounds = DimensionBounds::default();
        let err = GenerationRequest::new("cube", 100, 680)
            .validate(bounds)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: width must be between 256 and 2048, got 100"
        );
        assert!(GenerationRequest::new("cube", 1024, 4096).validate(bounds).is_err());
    }

    #[test]
    fn validate_rejects_blank_prompt() {
        let err = GenerationRequest::new("  ", 512, 512)
            .validate(DimensionBounds::default())
            .unwrap_err();
        assert!(matches!(err, ImageError::InvalidRequest(_)));
    }

    #[test]
    fn prompt_preview_is_char_bounded() {
        let request = GenerationRequest::new("ж".repeat(80), 512, 512);
        assert_eq!(request.prompt_preview().chars().count(), 50);
    }

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(ImageFormat::sniff(&[0x89, b'P', b'N', b'G']), ImageFormat::Png);
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), ImageFormat::Webp);
        assert_eq!(ImageFormat::sniff(&[]), ImageFormat::Png);
        assert_eq!(ImageFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageFormat::Webp.extension(), "webp");
    }

    #[test]
    fn attempt_log_display_lists_failures_in_order() {
        let mut log = AttemptLog::new();
        log.record_failure(
            "A",
            &ProviderError::Remote("quota exceeded".to_string()),
            Duration::from_millis(5),
        );
        log.record_success("B", 50, Duration::from_millis(7));

        assert_eq!(log.len(), 2);
        assert_eq!(log.attempts()[0].to_string(), "A: quota exceeded");
        assert!(log.attempts()[1].is_success());
        assert_eq!(log.to_string(), "A: quota exceeded; B: ok (50 bytes)");
    }

    #[test]
    fn all_timed_out_requires_only_timeouts() {
        let mut log = AttemptLog::new();
        assert!(!log.all_timed_out());

        log.record_failure("A", &ProviderError::Timeout("15s".to_string()), Duration::ZERO);
        assert!(log.all_timed_out());

        log.record_failure("B", &ProviderError::Remote("boom".to_string()), Duration::ZERO);
        assert!(!log.all_timed_out());
    }

    #[test]
    fn failed_attempt_carries_rate_limit_flag() {
        let mut log = AttemptLog::new();
        log.record_failure(
            "A",
            &ProviderError::Remote("HTTP 429".to_string()),
            Duration::ZERO,
        );
        assert!(matches!(
            log.attempts()[0].outcome,
            AttemptOutcome::Failed {
                rate_limited: true,
                kind: ErrorKind::Remote,
                ..
            }
        ));
    }
}
