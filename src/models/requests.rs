//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for `PUT /cache`
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: The value to store, as UTF-8 text
/// - `ttl`: Optional TTL in seconds (service default when absent or 0)
/// - `tags`: Optional tags for group invalidation
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl SetRequest {
    /// Shape checks only. Size limits are enforced by the service.
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if let Some(tags) = &self.tags {
            if tags.iter().any(|t| t.is_empty()) {
                return Some("Tags cannot be empty".to_string());
            }
        }
        None
    }
}

/// Request body for `POST /invalidate/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateTagsRequest {
    pub tags: Vec<String>,
}

impl InvalidateTagsRequest {
    pub fn validate(&self) -> Option<String> {
        if self.tags.is_empty() {
            return Some("At least one tag is required".to_string());
        }
        None
    }
}

/// Request body for `POST /invalidate/pattern`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidatePatternRequest {
    /// Glob pattern, `*` and `?` wildcards
    pub pattern: String,
}
