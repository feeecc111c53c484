//! API key authentication middleware
//!
//! Checks the `X-Token` header against the configured key using a
//! constant-time comparison. With no key configured every request passes.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::ApiError;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-token";

/// Layer that applies API key authentication
#[derive(Clone)]
pub struct ApiKeyAuthLayer {
    api_key: Option<Arc<SecretString>>,
    excluded_paths: Vec<String>,
}

impl std::fmt::Debug for ApiKeyAuthLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuthLayer")
            .field("enabled", &self.api_key.is_some())
            .field("excluded_paths", &self.excluded_paths)
            .finish()
    }
}

impl ApiKeyAuthLayer {
    /// Create a new auth layer
    ///
    /// Authentication is disabled when `api_key` is `None` or empty.
    #[must_use]
    pub fn new(api_key: Option<SecretString>) -> Self {
        Self {
            api_key: api_key
                .filter(|key| !key.expose_secret().is_empty())
                .map(Arc::new),
            excluded_paths: vec!["/health".to_string()],
        }
    }

    /// Create a layer that lets every request through
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Add paths that should be excluded from authentication
    #[must_use]
    pub fn exclude_paths(mut self, paths: Vec<String>) -> Self {
        self.excluded_paths.extend(paths);
        self
    }
}

impl<S> Layer<S> for ApiKeyAuthLayer {
    type Service = ApiKeyAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyAuth {
            inner,
            api_key: self.api_key.clone(),
            excluded_paths: self.excluded_paths.clone(),
        }
    }
}

/// Middleware service for API key authentication
#[derive(Clone)]
pub struct ApiKeyAuth<S> {
    inner: S,
    api_key: Option<Arc<SecretString>>,
    excluded_paths: Vec<String>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for ApiKeyAuth<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("inner", &self.inner)
            .field("enabled", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request> for ApiKeyAuth<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let api_key = self.api_key.clone();
        let excluded_paths = self.excluded_paths.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = req.uri().path();
            if excluded_paths.iter().any(|p| is_excluded(path, p)) {
                return inner.call(req).await;
            }

            let Some(expected) = api_key else {
                return inner.call(req).await;
            };

            let provided = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok());

            match provided {
                Some(token) if keys_match(token, expected.expose_secret()) => {
                    debug!("API key verified");
                    inner.call(req).await
                },
                Some(_) => {
                    warn!(path = %req.uri().path(), "Rejected request with invalid API key");
                    Ok(unauthorized_response("Invalid API key"))
                },
                None => Ok(unauthorized_response("Missing X-Token header")),
            }
        })
    }
}

/// `path` equals `excluded` or lies below it (`/health/live`), never a
/// sibling sharing the prefix (`/healthz`). Dot segments are not exempt.
fn is_excluded(path: &str, excluded: &str) -> bool {
    if path.split('/').any(|segment| segment == "." || segment == "..") {
        return false;
    }
    path.strip_prefix(excluded)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    ApiError::Unauthorized(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::StatusCode, routing::get};
    use tower::ServiceExt;

    use super::*;

    async fn test_handler() -> &'static str {
        "ok"
    }

    fn create_test_router(layer: ApiKeyAuthLayer) -> Router {
        Router::new()
            .route("/test", get(test_handler))
            .route("/health", get(test_handler))
            .layer(layer)
    }

    fn keyed_router() -> Router {
        create_test_router(ApiKeyAuthLayer::new(Some(SecretString::from("secret-key"))))
    }

    async fn status_for(app: Router, uri: &str, token: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(API_KEY_HEADER, token);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn auth_disabled_when_no_key_configured() {
        let app = create_test_router(ApiKeyAuthLayer::disabled());
        assert_eq!(status_for(app, "/test", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_key_disables_auth() {
        let app = create_test_router(ApiKeyAuthLayer::new(Some(SecretString::from(""))));
        assert_eq!(status_for(app, "/test", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_token_passes() {
        assert_eq!(
            status_for(keyed_router(), "/test", Some("secret-key")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn invalid_token_rejected() {
        assert_eq!(
            status_for(keyed_router(), "/test", Some("wrong-key")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn prefix_of_key_rejected() {
        assert_eq!(
            status_for(keyed_router(), "/test", Some("secret")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        assert_eq!(
            status_for(keyed_router(), "/test", None).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn health_endpoint_excluded_from_auth() {
        assert_eq!(status_for(keyed_router(), "/health", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn paths_sharing_the_health_prefix_require_auth() {
        for uri in ["/healthz-admin", "/health-check", "/health/../test"] {
            assert_eq!(
                status_for(keyed_router(), uri, None).await,
                StatusCode::UNAUTHORIZED,
                "{uri}"
            );
        }
    }

    #[test]
    fn exclusion_matches_whole_segments() {
        assert!(is_excluded("/health", "/health"));
        assert!(is_excluded("/health/live", "/health"));
        assert!(!is_excluded("/healthz", "/health"));
        assert!(!is_excluded("/health/../generate", "/health"));
        assert!(!is_excluded("/generate", "/health"));
    }

    #[tokio::test]
    async fn additional_excluded_paths() {
        let app = create_test_router(
            ApiKeyAuthLayer::new(Some(SecretString::from("secret-key")))
                .exclude_paths(vec!["/test".to_string()]),
        );
        assert_eq!(status_for(app, "/test", None).await, StatusCode::OK);
    }

    #[test]
    fn debug_hides_key() {
        let layer = ApiKeyAuthLayer::new(Some(SecretString::from("secret-key")));
        let debug = format!("{layer:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("enabled: true"));
    }
}
