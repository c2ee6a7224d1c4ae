//! Remote Module
//!
//! The shared networked layer (L2): raw store implementations, the circuit
//! breaker, the guarded client and the health monitor.

mod breaker;
mod client;
mod health;
mod memory;
mod redis_store;
mod store;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use client::{RemoteMetrics, RemoteStoreClient};
pub use health::{HealthMonitor, HealthStatus};
pub use memory::{glob_match, MemoryStore};
pub use redis_store::RedisStore;
pub use store::RemoteStore;
