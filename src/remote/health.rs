//! Remote store health monitor.
//!
//! Pings the store directly, outside the request path's breaker, and keeps
//! the last result for external reporting. A failing ping never opens the
//! breaker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::remote::RemoteStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    /// `None` until the first check completes
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub latency_ms: f64,
}

pub struct HealthMonitor {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
    status: RwLock<HealthStatus>,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            status: RwLock::new(HealthStatus::default()),
        }
    }

    /// Runs one ping and records the outcome.
    pub async fn check_now(&self) -> HealthStatus {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.store.ping()).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("health check timed out".to_string()),
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut status = self.status.write();
        let was_healthy = status.is_healthy;
        match outcome {
            Ok(()) => {
                if !was_healthy {
                    info!(latency_ms, "remote store healthy");
                }
                status.is_healthy = true;
                status.last_error = None;
            }
            Err(e) => {
                if was_healthy || status.last_check.is_none() {
                    warn!(error = %e, "remote store health check failed");
                }
                status.is_healthy = false;
                status.last_error = Some(e);
            }
        }
        status.last_check = Some(Utc::now());
        status.latency_ms = latency_ms;
        status.clone()
    }

    /// Last recorded status.
    pub fn status(&self) -> HealthStatus {
        self.status.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;

    #[tokio::test]
    async fn test_unknown_before_first_check() {
        let monitor = HealthMonitor::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let status = monitor.status();
        assert!(!status.is_healthy);
        assert!(status.last_check.is_none());
    }

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let store = Arc::new(MemoryStore::new());
        let monitor = HealthMonitor::new(
            Arc::clone(&store) as Arc<dyn RemoteStore>,
            Duration::from_secs(1),
        );

        assert!(monitor.check_now().await.is_healthy);

        store.set_failing(true);
        let status = monitor.check_now().await;
        assert!(!status.is_healthy);
        assert!(status.last_error.is_some());
        assert_eq!(monitor.status(), status);

        store.set_failing(false);
        let status = monitor.check_now().await;
        assert!(status.is_healthy);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_slow_ping_times_out() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Some(Duration::from_millis(100)));
        let monitor = HealthMonitor::new(store, Duration::from_millis(10));

        let status = monitor.check_now().await;
        assert!(!status.is_healthy);
        assert_eq!(status.last_error.as_deref(), Some("health check timed out"));
    }
}
