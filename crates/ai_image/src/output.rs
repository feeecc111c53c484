//! Job output parsing and local artifact handling
//!
//! Gradio Spaces disagree on what their first output looks like. Each adapter
//! lists the shapes it accepts, in priority order, and [`extract_artifact`]
//! takes the first one that matches.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Where an image produced by a job can be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRef {
    /// File on the local filesystem
    Path(PathBuf),
    /// Remote URL that still has to be downloaded
    Url(String),
}

impl ArtifactRef {
    fn from_str(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else if value.starts_with("http://") || value.starts_with("https://") {
            Some(Self::Url(value.to_string()))
        } else {
            Some(Self::Path(PathBuf::from(value)))
        }
    }
}

/// Known shapes of the first job output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// A bare string holding a path or URL
    PlainPath,
    /// A record with a `path` key
    PathField,
    /// A record with a `url` key
    UrlField,
    /// A record with an `image` key, itself a string or file record
    ImageField,
    /// A list of `{image, caption}` records, the first one is used
    Gallery,
}

impl OutputShape {
    /// Try to read an artifact reference from `value` in this shape
    #[must_use]
    pub fn extract(self, value: &Value) -> Option<ArtifactRef> {
        match self {
            Self::PlainPath => value.as_str().and_then(ArtifactRef::from_str),
            Self::PathField => value
                .get("path")
                .and_then(Value::as_str)
                .and_then(ArtifactRef::from_str),
            Self::UrlField => value
                .get("url")
                .and_then(Value::as_str)
                .and_then(ArtifactRef::from_str),
            Self::ImageField => value.get("image").and_then(file_ref),
            Self::Gallery => value
                .as_array()
                .and_then(|items| items.first())
                .and_then(|item| item.get("image"))
                .and_then(file_ref),
        }
    }
}

// A string, or a file record preferring its local path over its URL
fn file_ref(value: &Value) -> Option<ArtifactRef> {
    OutputShape::PlainPath
        .extract(value)
        .or_else(|| OutputShape::PathField.extract(value))
        .or_else(|| OutputShape::UrlField.extract(value))
}

/// Pick the artifact out of a job's outputs
///
/// Only the first output is inspected; later outputs are seeds and similar
/// metadata.
///
/// # Errors
///
/// Returns `ProviderError::Parse` with the raw outputs when no shape matches.
pub fn extract_artifact(
    provider: &str,
    outputs: &[Value],
    shapes: &[OutputShape],
) -> Result<ArtifactRef, ProviderError> {
    outputs
        .first()
        .and_then(|first| shapes.iter().find_map(|shape| shape.extract(first)))
        .ok_or_else(|| {
            ProviderError::parse(
                format!("{provider} returned no recognizable image"),
                &Value::Array(outputs.to_vec()),
            )
        })
}

/// Local files that must not outlive the adapter call
///
/// Every tracked file is removed when the guard drops, whether the call
/// succeeded or not.
#[derive(Debug, Default)]
pub struct Artifacts {
    paths: Vec<PathBuf>,
}

impl Artifacts {
    /// Create an empty guard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track additional files
    pub fn track(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.paths.extend(paths);
    }

    /// Number of tracked files
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether `path` is one of the tracked files
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|tracked| tracked == path)
    }
}

impl Drop for Artifacts {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed artifact"),
                Err(e) if e.kind() == IoErrorKind::NotFound => {},
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove artifact"),
            }
        }
    }
}

/// Read the artifact into memory
///
/// A local path is only read when it is already tracked in `artifacts`,
/// i.e. when the job client wrote it for this call. URLs are fetched with
/// `client`.
///
/// # Errors
///
/// Returns `ProviderError::Parse` for a local path the job did not produce,
/// and `ProviderError::Remote` when the file cannot be read or the download
/// fails.
pub async fn load_artifact(
    client: &reqwest::Client,
    artifact: ArtifactRef,
    artifacts: &Artifacts,
) -> Result<Bytes, ProviderError> {
    match artifact {
        ArtifactRef::Path(path) => {
            if !artifacts.contains(&path) {
                warn!(path = %path.display(), "Job output points at a file it did not produce");
                return Err(ProviderError::parse(
                    "Job output refers to a local file that was not downloaded for this call",
                    &path.display(),
                ));
            }
            read_local(&path).await
        },
        ArtifactRef::Url(url) => crate::providers::download(client, &url).await,
    }
}

async fn read_local(path: &Path) -> Result<Bytes, ProviderError> {
    let data = tokio::fs::read(path).await.map_err(|e| {
        ProviderError::Remote(format!(
            "Failed to read image file {}: {e}",
            path.display()
        ))
    })?;
    if data.is_empty() {
        return Err(ProviderError::Remote(format!(
            "Image file {} is empty",
            path.display()
        )));
    }
    Ok(Bytes::from(data))
}
