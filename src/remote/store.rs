//! Remote Store Trait
//!
//! The raw network operations the remote layer needs. Implementations carry
//! no breaker, timeout or metrics logic; `RemoteStoreClient` adds those.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Sets only if absent. Returns true if the value was written.
    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Returns the number of keys removed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// One flag per key, in input order.
    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>>;

    /// One slot per key, in input order.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    async fn mset(&self, items: &[(String, Vec<u8>)], ttl: Duration) -> Result<()>;

    async fn incr(&self, key: &str, delta: i64) -> Result<i64>;

    /// Cursor-based scan; returns every distinct key matching the glob.
    async fn scan(&self, pattern: &str, count: usize) -> Result<Vec<String>>;

    /// Adds `member` to each set in one round trip. Each set's expiry is
    /// raised to `ttl` from now if that is later, and never shortened.
    async fn add_to_sets(&self, member: &str, set_keys: &[String], ttl: Duration) -> Result<()>;

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}
