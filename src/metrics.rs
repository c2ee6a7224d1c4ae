//! Latency averaging shared by the service and remote-store metrics.

use std::time::Duration;

/// Smoothing factor for every latency average.
pub const EMA_ALPHA: f64 = 0.1;

// == Ema ==
/// Exponentially weighted moving average: `avg = avg * (1 - α) + sample * α`.
///
/// The first sample seeds the average directly.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ema {
    value: Option<f64>,
}

impl Ema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the average.
    pub fn record(&mut self, sample: f64) {
        self.value = Some(match self.value {
            Some(avg) => avg * (1.0 - EMA_ALPHA) + sample * EMA_ALPHA,
            None => sample,
        });
    }

    /// Folds a duration in milliseconds.
    pub fn record_duration(&mut self, elapsed: Duration) {
        self.record(elapsed.as_secs_f64() * 1000.0);
    }

    /// Current average, 0.0 before any sample.
    pub fn value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}
