//! Background Tasks Module
//!
//! # Tasks
//! - TTL Cleanup: sweeps expired local entries at a configured interval
//! - Health Check: pings the remote store at a configured interval
//! - Background Pool: runs fire-and-forget backfill and access-stat jobs

mod background;
mod cleanup;
mod health;

pub use background::BackgroundPool;
pub use cleanup::spawn_cleanup_task;
pub use health::spawn_health_task;
