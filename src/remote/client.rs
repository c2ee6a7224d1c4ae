//! Remote Store Client Module
//!
//! Wraps a [`RemoteStore`] with the circuit breaker, a per-call deadline and
//! rolling performance metrics.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::metrics::Ema;
use crate::remote::{BreakerSnapshot, CircuitBreaker, RemoteStore};

// == Remote Metrics ==
/// Snapshot of the client's counters, taken under a single lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteMetrics {
    /// Calls that reached the network
    pub total_ops: u64,
    pub successes: u64,
    pub failures: u64,
    /// Successful lookups that found nothing
    pub not_found: u64,
    /// Calls short-circuited by the open breaker
    pub rejected: u64,
    /// EMA of call latency in milliseconds
    pub avg_latency_ms: f64,
    pub breaker: BreakerSnapshot,
}

#[derive(Debug, Default)]
struct MetricsState {
    total_ops: u64,
    successes: u64,
    failures: u64,
    not_found: u64,
    rejected: u64,
    latency: Ema,
}

// == Remote Store Client ==
/// The L2 client. Every operation:
/// 1. asks the breaker for permission, failing fast with `Unavailable`;
/// 2. runs the call under the command timeout;
/// 3. records latency and outcome;
/// 4. reports success or failure to the breaker.
///
/// A missing key is a successful call mapped to `NotFound`.
pub struct RemoteStoreClient {
    store: Arc<dyn RemoteStore>,
    breaker: CircuitBreaker,
    metrics: Mutex<MetricsState>,
    timeout: Duration,
}

impl RemoteStoreClient {
    pub fn new(store: Arc<dyn RemoteStore>, breaker: CircuitBreaker, timeout: Duration) -> Self {
        Self {
            store,
            breaker,
            metrics: Mutex::new(MetricsState::default()),
            timeout,
        }
    }

    async fn execute<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.breaker.allow_request() {
            self.metrics.lock().rejected += 1;
            debug!(op, "remote call rejected by open circuit breaker");
            return Err(CacheError::Unavailable(format!(
                "circuit breaker open, {} skipped",
                op
            )));
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };
        let elapsed = started.elapsed();

        {
            let mut metrics = self.metrics.lock();
            metrics.total_ops += 1;
            metrics.latency.record_duration(elapsed);
            if outcome.is_ok() {
                metrics.successes += 1;
            } else {
                metrics.failures += 1;
            }
        }

        match &outcome {
            Ok(_) => self.breaker.record_success(),
            Err(e) => {
                self.breaker.record_failure();
                warn!(
                    op,
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "remote store call failed"
                );
            }
        }
        outcome
    }

    fn not_found(&self, key: &str) -> CacheError {
        self.metrics.lock().not_found += 1;
        CacheError::NotFound(key.to_string())
    }

    // == Operations ==
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        match self.execute("get", self.store.get(key)).await? {
            Some(bytes) => Ok(bytes),
            None => Err(self.not_found(key)),
        }
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.execute("set", self.store.set(key, value, ttl)).await
    }

    pub async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.execute("set_nx", self.store.set_nx(key, value, ttl)).await
    }

    pub async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.execute("delete", self.store.delete(keys)).await
    }

    pub async fn exists(&self, keys: &[String]) -> Result<Vec<bool>> {
        self.execute("exists", self.store.exists(keys)).await
    }

    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.execute("mget", self.store.mget(keys)).await
    }

    pub async fn mset(&self, items: &[(String, Vec<u8>)], ttl: Duration) -> Result<()> {
        self.execute("mset", self.store.mset(items, ttl)).await
    }

    pub async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.execute("increment", self.store.incr(key, delta)).await
    }

    /// Cursor-scans for every key matching the glob `pattern`.
    pub async fn scan_keys(&self, pattern: &str, count: usize) -> Result<Vec<String>> {
        self.execute("scan", self.store.scan(pattern, count)).await
    }

    /// Registers `key` in every tag set, extending (never shortening) their expiry.
    pub async fn add_to_tags(&self, key: &str, tag_keys: &[String], ttl: Duration) -> Result<()> {
        self.execute("add_to_tags", self.store.add_to_sets(key, tag_keys, ttl)).await
    }

    pub async fn tag_members(&self, tag_key: &str) -> Result<Vec<String>> {
        self.execute("tag_members", self.store.set_members(tag_key)).await
    }

    // == Introspection ==
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The wrapped store, for callers that must bypass the breaker (health checks).
    pub fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.store)
    }

    pub fn metrics(&self) -> RemoteMetrics {
        let breaker = self.breaker.snapshot();
        let metrics = self.metrics.lock();
        RemoteMetrics {
            total_ops: metrics.total_ops,
            successes: metrics.successes,
            failures: metrics.failures,
            not_found: metrics.not_found,
            rejected: metrics.rejected,
            avg_latency_ms: metrics.latency.value(),
            breaker,
        }
    }

    /// Zeroes the counters and latency average. Operator action.
    pub fn reset_metrics(&self) {
        *self.metrics.lock() = MetricsState::default();
    }
}
