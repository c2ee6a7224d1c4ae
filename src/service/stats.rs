//! Service Statistics Module
//!
//! Counters for the orchestrator. Snapshots are built entirely under the
//! lock so derived values always agree with the counters they came from.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::metrics::Ema;

// == Service Stats ==
/// Immutable snapshot returned by `CacheService::get_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceStats {
    pub total_ops: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    /// EMA of read latency in milliseconds
    pub avg_read_time_ms: f64,
    /// EMA of write latency in milliseconds
    pub avg_write_time_ms: f64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    total_ops: u64,
    errors: u64,
    l1_hits: u64,
    l1_misses: u64,
    l2_hits: u64,
    l2_misses: u64,
    read_time: Ema,
    write_time: Ema,
}

/// Which layer answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    L1Hit,
    L2Hit,
    /// Missed L1, L2 not consulted or failed
    L1Miss,
    /// Missed both layers
    Miss,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    inner: Mutex<Counters>,
}

impl StatsRecorder {
    pub fn record_op(&self) {
        self.inner.lock().total_ops += 1;
    }

    pub fn record_error(&self) {
        self.inner.lock().errors += 1;
    }

    pub fn record_lookup(&self, lookup: Lookup) {
        let mut c = self.inner.lock();
        match lookup {
            Lookup::L1Hit => c.l1_hits += 1,
            Lookup::L2Hit => {
                c.l1_misses += 1;
                c.l2_hits += 1;
            }
            Lookup::L1Miss => c.l1_misses += 1,
            Lookup::Miss => {
                c.l1_misses += 1;
                c.l2_misses += 1;
            }
        }
    }

    pub fn record_read(&self, elapsed: Duration) {
        self.inner.lock().read_time.record_duration(elapsed);
    }

    pub fn record_write(&self, elapsed: Duration) {
        self.inner.lock().write_time.record_duration(elapsed);
    }

    pub fn snapshot(&self) -> ServiceStats {
        let c = self.inner.lock();
        let hits = c.l1_hits + c.l2_hits;
        let misses = c.l2_misses;
        let lookups = hits + misses;
        ServiceStats {
            total_ops: c.total_ops,
            hits,
            misses,
            errors: c.errors,
            l1_hits: c.l1_hits,
            l1_misses: c.l1_misses,
            l2_hits: c.l2_hits,
            l2_misses: c.l2_misses,
            avg_read_time_ms: c.read_time.value(),
            avg_write_time_ms: c.write_time.value(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    pub fn reset(&self) {
        *self.inner.lock() = Counters::default();
    }
}
