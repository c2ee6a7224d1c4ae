//! Circuit Breaker Module
//!
//! Failure-counting state machine guarding every remote-store call.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without touching the network
    Open,
    /// Timeout elapsed; probing calls are let through
    HalfOpen,
}

/// Copy of the breaker fields taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

// == Circuit Breaker ==
/// Closed -> Open after `max_failures` consecutive failures; Open -> HalfOpen
/// once `timeout` has elapsed since the last failure; any success closes it.
///
/// HalfOpen admits every caller, not a single trial call. A burst arriving while
/// half-open all reaches the remote store.
#[derive(Debug)]
pub struct CircuitBreaker {
    max_failures: u32,
    timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, timeout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    // == Allow Request ==
    /// Returns whether a call may proceed right now.
    pub fn allow_request(&self) -> bool {
        self.allow_request_at(Instant::now())
    }

    pub(crate) fn allow_request_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!("circuit breaker half-open, probing remote store");
                    true
                } else {
                    false
                }
            }
        }
    }

    // == Record Success ==
    /// Resets the failure count and closes the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(previous = ?inner.state, "circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    // == Record Failure ==
    /// Counts a failure, opening the breaker at the threshold.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub(crate) fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(now);

        // The count is not cleared on Open -> HalfOpen, so a failed trial call reopens
        if inner.failure_count >= self.max_failures && inner.state != CircuitState::Open {
            warn!(
                failures = inner.failure_count,
                "circuit breaker opened, bypassing remote store"
            );
            inner.state = CircuitState::Open;
        }
    }

    /// Forces the breaker closed. Operator action.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }
}
