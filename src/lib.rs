//! Layered Cache - a two-tier cache for read-heavy services
//!
//! An in-process LRU with per-entry TTL (L1) in front of a shared Redis
//! layer (L2) guarded by a circuit breaker, with tag and pattern
//! invalidation across both.

pub mod api;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod keys;
pub mod metrics;
pub mod models;
pub mod remote;
pub mod service;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{CacheError, ErrorKind, Result};
pub use invalidation::{CacheInvalidator, InvalidationReport};
pub use keys::KeyBuilder;
pub use service::{CacheService, ServiceStats};
pub use tasks::{spawn_cleanup_task, spawn_health_task};
