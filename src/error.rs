//! Error types for the layered cache
//!
//! Provides a single tagged error type using thiserror. Callers branch on
//! [`CacheError::kind`] instead of comparing against shared sentinel values.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

// == Error Kind ==
/// Coarse error category, stable across variants' payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    Validation,
    Codec,
    Remote,
}

// == Cache Error Enum ==
/// Unified error type for every cache layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent or expired in every layer consulted. This is the expected miss path.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Circuit breaker is open; the remote layer is being bypassed
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Key or value violates size or format constraints
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization or compression failure on stored data
    #[error("Codec error: {0}")]
    Codec(String),

    /// Network, timeout or protocol failure from the remote store
    #[error("Remote store error: {0}")]
    Remote(String),
}

impl CacheError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::NotFound(_) => ErrorKind::NotFound,
            CacheError::Unavailable(_) => ErrorKind::Unavailable,
            CacheError::Validation(_) => ErrorKind::Validation,
            CacheError::Codec(_) => ErrorKind::Codec,
            CacheError::Remote(_) => ErrorKind::Remote,
        }
    }

    /// True for the expected miss signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

// == Conversions ==
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Remote(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CacheError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CacheError::Remote("operation timed out".to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Validation(_) => StatusCode::BAD_REQUEST,
            CacheError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Remote(_) => StatusCode::BAD_GATEWAY,
            CacheError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

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
    fn test_kind_matches_variant() {
        assert_eq!(CacheError::NotFound("k".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            CacheError::Unavailable("open".into()).kind(),
            ErrorKind::Unavailable
        );
        assert_eq!(CacheError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(CacheError::Codec("x".into()).kind(), ErrorKind::Codec);
        assert_eq!(CacheError::Remote("x".into()).kind(), ErrorKind::Remote);
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (CacheError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (CacheError::Validation("k".into()), StatusCode::BAD_REQUEST),
            (
                CacheError::Unavailable("k".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CacheError::Remote("k".into()), StatusCode::BAD_GATEWAY),
            (CacheError::Codec("k".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_json_error_maps_to_codec() {
        let err: CacheError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Codec);
    }
}
