//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for stores, facades and the HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent, or present but logically expired
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Value could not be marshaled to or from bytes
    #[error("Encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Compress or decompress transform failed (corrupt or truncated stream)
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),

    /// Invalid store configuration, e.g. an unknown compression algorithm
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Error raised by an external backend client, passed through unchanged
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid request data (HTTP surface)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Wraps an external client error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CacheError::Backend(Box::new(err))
    }

    /// Returns true for the NotFound condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Encoding(_) => StatusCode::BAD_REQUEST,
            CacheError::Compression(_)
            | CacheError::Configuration(_)
            | CacheError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = CacheError::NotFound("users".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_request_maps_to_400() {
        let response = CacheError::InvalidRequest("empty key".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_backend_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = CacheError::backend(io);
        assert!(err.to_string().contains("refused"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_not_found());
    }
}
