//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::LocalStats;
use crate::invalidation::InvalidationReport;
use crate::remote::{BreakerSnapshot, HealthStatus, RemoteMetrics};
use crate::service::ServiceStats;

/// Response body for `GET /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    /// Stored bytes decoded as UTF-8, lossily
    pub value: String,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: &[u8]) -> Self {
        Self {
            key: key.into(),
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }
}

/// Response body for `PUT /cache`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' stored", key),
            key,
        }
    }
}

/// Response body for `DELETE /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' removed from both layers", key),
            key,
        }
    }
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub service: ServiceStats,
    pub local: LocalStats,
    pub remote: RemoteMetrics,
}

/// Response body for `GET /health`
///
/// `status` is "healthy" or "degraded". A degraded cache still serves
/// from L1.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub remote: HealthStatus,
    pub breaker: BreakerSnapshot,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn from_status(remote: HealthStatus, breaker: BreakerSnapshot) -> Self {
        let status = if remote.is_healthy {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            remote,
            breaker,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for both invalidation endpoints
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationResponse {
    pub clean: bool,
    #[serde(flatten)]
    pub report: InvalidationReport,
}

impl From<InvalidationReport> for InvalidationResponse {
    fn from(report: InvalidationReport) -> Self {
        Self {
            clean: report.is_clean(),
            report,
        }
    }
}
