//! Health Check Task
//!
//! Periodically pings the remote store through the [`HealthMonitor`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::remote::HealthMonitor;

/// Spawns the periodic health check. The first check runs immediately.
pub fn spawn_health_task(monitor: Arc<HealthMonitor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting remote health check task"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let status = monitor.check_now().await;
            debug!(
                healthy = status.is_healthy,
                latency_ms = status.latency_ms,
                "health check completed"
            );
        }
    })
}
