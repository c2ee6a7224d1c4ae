//! Cache Service Module
//!
//! The orchestrator over both layers. Reads are cache-first (L1, then L2
//! with backfill), writes go to L1 then L2, and invalidation is delegated
//! to the [`CacheInvalidator`].
//!
//! The cache accelerates, it never gates correctness: a `NotFound` or an
//! `Unavailable` result means the caller computes the value itself.

mod stats;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::{CacheEntry, FillTicket, LocalCache, LocalStats};
use crate::codec::{Compressor, GzipCompressor, JsonSerializer, Serializer};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::invalidation::{CacheInvalidator, InvalidationReport};
use crate::keys::KeyBuilder;
use crate::remote::{
    CircuitBreaker, HealthMonitor, HealthStatus, RemoteMetrics, RemoteStore, RemoteStoreClient,
};
use crate::tasks::BackgroundPool;

pub use stats::ServiceStats;
use stats::{Lookup, StatsRecorder};

/// Tag sets outlive the longest tagged entry by this much.
pub const TAG_TTL_PADDING: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Limits {
    default_ttl: Duration,
    compression_enabled: bool,
    compression_threshold: usize,
    max_key_length: usize,
    max_value_size: usize,
}

// == Cache Service ==
pub struct CacheService {
    local: Arc<LocalCache>,
    remote: Arc<RemoteStoreClient>,
    invalidator: CacheInvalidator,
    health: Arc<HealthMonitor>,
    keys: KeyBuilder,
    serializer: Arc<dyn Serializer>,
    compressor: Arc<dyn Compressor>,
    background: BackgroundPool,
    limits: Limits,
    stats: StatsRecorder,
}

impl CacheService {
    /// Builds the service with the JSON serializer and gzip compressor.
    ///
    /// Spawns the background workers, so it must run inside a Tokio runtime.
    pub fn new(config: &Config, store: Arc<dyn RemoteStore>) -> Self {
        Self::with_codecs(
            config,
            store,
            Arc::new(JsonSerializer),
            Arc::new(GzipCompressor::default()),
        )
    }

    pub fn with_codecs(
        config: &Config,
        store: Arc<dyn RemoteStore>,
        serializer: Arc<dyn Serializer>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        let local = Arc::new(LocalCache::new(config.local_capacity));
        let remote = Arc::new(RemoteStoreClient::new(
            store,
            CircuitBreaker::new(config.breaker_max_failures, config.breaker_timeout),
            config.command_timeout,
        ));
        let health = Arc::new(HealthMonitor::new(remote.store(), config.command_timeout));
        let keys = KeyBuilder::new(config.key_prefix.clone());
        let invalidator = CacheInvalidator::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            keys.clone(),
            config.invalidation_batch_size,
            config.invalidation_timeout,
        );

        Self {
            local,
            remote,
            invalidator,
            health,
            keys,
            serializer,
            compressor,
            background: BackgroundPool::new(config.background_workers, config.background_queue),
            limits: Limits {
                default_ttl: config.default_ttl,
                compression_enabled: config.compression_enabled,
                compression_threshold: config.compression_threshold,
                max_key_length: config.max_key_length,
                max_value_size: config.max_value_size,
            },
            stats: StatsRecorder::default(),
        }
    }

    // == Get ==
    /// Cache-first read.
    ///
    /// A corrupt L1 entry is evicted and the read falls through to L2. An L2
    /// hit is returned immediately; the L1 backfill (under the default TTL,
    /// not the entry's remaining TTL) happens in the background and is
    /// dropped if the key was written or invalidated after the L1 miss.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.stats.record_op();
        let started = Instant::now();
        let result = self.get_inner(key).await;
        self.stats.record_read(started.elapsed());
        if let Err(e) = &result {
            if !e.is_not_found() {
                self.stats.record_error();
            }
        }
        result
    }

    async fn get_inner(&self, key: &str) -> Result<Vec<u8>> {
        self.validate_key(key)?;

        if let Some(data) = self.read_local(key) {
            self.stats.record_lookup(Lookup::L1Hit);
            return Ok(data);
        }

        let ticket = self.local.begin_fill(key);
        let raw = match self.remote.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                self.local.abandon_fill(key, ticket);
                let lookup = if e.is_not_found() {
                    Lookup::Miss
                } else {
                    Lookup::L1Miss
                };
                self.stats.record_lookup(lookup);
                return Err(e);
            }
        };

        let (data, entry) = match self.decode_remote(key, &raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.local.abandon_fill(key, ticket);
                self.stats.record_lookup(Lookup::L1Miss);
                return Err(e);
            }
        };
        self.stats.record_lookup(Lookup::L2Hit);
        self.schedule_backfill(entry, ticket);
        Ok(data)
    }

    // == Set ==
    /// Writes to L1, then L2. An L2 failure is returned even though the L1
    /// write has already landed; the layers are not transactional.
    pub async fn set(&self, key: &str, data: &[u8], ttl: Duration) -> Result<()> {
        self.stats.record_op();
        let started = Instant::now();
        let result = self.write(key, data, ttl, Vec::new()).await;
        self.finish_write(started, &result);
        result
    }

    // == Set With Tags ==
    /// Performs a set, then registers the key in one remote set per tag. Tag
    /// sets expire `TAG_TTL_PADDING` after the entry would.
    pub async fn set_with_tags(
        &self,
        key: &str,
        data: &[u8],
        ttl: Duration,
        tags: &[String],
    ) -> Result<()> {
        self.stats.record_op();
        let started = Instant::now();
        let result = self.write_tagged(key, data, ttl, tags).await;
        self.finish_write(started, &result);
        result
    }

    async fn write_tagged(
        &self,
        key: &str,
        data: &[u8],
        ttl: Duration,
        tags: &[String],
    ) -> Result<()> {
        for tag in tags {
            self.validate_tag(tag)?;
        }
        self.write(key, data, ttl, tags.to_vec()).await?;
        if tags.is_empty() {
            return Ok(());
        }

        let tag_keys: Vec<String> = tags.iter().map(|tag| self.keys.tag(tag)).collect();
        let tag_ttl = self.effective_ttl(ttl) + TAG_TTL_PADDING;
        self.remote.add_to_tags(key, &tag_keys, tag_ttl).await
    }

    async fn write(&self, key: &str, data: &[u8], ttl: Duration, tags: Vec<String>) -> Result<()> {
        self.validate_key(key)?;
        self.validate_value(data)?;
        let ttl = self.effective_ttl(ttl);

        let entry = self.build_entry(key, data, ttl)?.with_tags(tags);
        let wire = self.serializer.serialize(&entry)?;
        self.local.set(key, entry, ttl);
        self.remote.set(key, &wire, ttl).await
    }

    // == Delete ==
    /// Removes keys from both layers.
    pub async fn delete(&self, keys: &[String]) -> Result<()> {
        self.stats.record_op();
        let result = self.delete_inner(keys).await;
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    async fn delete_inner(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.validate_key(key)?;
        }
        for key in keys {
            self.local.delete(key);
        }
        let result = self.remote.delete(keys).await;
        // A read that missed L1 before the remote delete may have queued a fill
        for key in keys {
            self.local.delete(key);
        }
        result.map(|removed| {
            debug!(requested = keys.len(), removed, "deleted keys");
        })
    }

    // == Exists ==
    /// Reports, per key, whether either layer holds it. Invalid keys and keys
    /// the remote layer could not answer for report false.
    pub async fn exists(&self, keys: &[String]) -> HashMap<String, bool> {
        self.stats.record_op();
        let mut found = HashMap::with_capacity(keys.len());
        let mut remaining = Vec::new();

        for key in keys {
            if self.validate_key(key).is_err() {
                found.insert(key.clone(), false);
            } else if self.local.exists(key) {
                found.insert(key.clone(), true);
            } else {
                remaining.push(key.clone());
            }
        }

        if remaining.is_empty() {
            return found;
        }

        match self.remote.exists(&remaining).await {
            Ok(flags) => found.extend(remaining.into_iter().zip(flags)),
            Err(e) => {
                self.stats.record_error();
                warn!(error = %e, "remote exists failed, reporting absent");
                found.extend(remaining.into_iter().map(|key| (key, false)));
            }
        }
        found
    }

    // == MGet ==
    /// Batch read: L1 per key, one remote multi-get for the misses, and a
    /// background backfill for every L2 hit. Missing keys are omitted. If
    /// the remote layer fails, the L1 hits are still returned.
    pub async fn mget(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        self.stats.record_op();
        let started = Instant::now();
        let result = self.mget_inner(keys).await;
        self.stats.record_read(started.elapsed());
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    async fn mget_inner(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        for key in keys {
            self.validate_key(key)?;
        }

        let mut found = HashMap::with_capacity(keys.len());
        let mut seen = HashSet::with_capacity(keys.len());
        let mut misses = Vec::new();
        for key in keys {
            if !seen.insert(key.as_str()) {
                continue;
            }
            match self.read_local(key) {
                Some(data) => {
                    self.stats.record_lookup(Lookup::L1Hit);
                    found.insert(key.clone(), data);
                }
                None => misses.push(key.clone()),
            }
        }

        if misses.is_empty() {
            return Ok(found);
        }

        let tickets: Vec<FillTicket> =
            misses.iter().map(|key| self.local.begin_fill(key)).collect();
        let values = match self.remote.mget(&misses).await {
            Ok(values) => values,
            Err(e) => {
                self.stats.record_error();
                warn!(
                    error = %e,
                    misses = misses.len(),
                    "remote mget failed, returning local hits"
                );
                for (key, ticket) in misses.iter().zip(tickets) {
                    self.local.abandon_fill(key, ticket);
                    self.stats.record_lookup(Lookup::L1Miss);
                }
                return Ok(found);
            }
        };

        for ((key, ticket), value) in misses.into_iter().zip(tickets).zip(values) {
            let Some(raw) = value else {
                self.local.abandon_fill(&key, ticket);
                self.stats.record_lookup(Lookup::Miss);
                continue;
            };
            match self.decode_remote(&key, &raw) {
                Ok((data, entry)) => {
                    self.stats.record_lookup(Lookup::L2Hit);
                    self.schedule_backfill(entry, ticket);
                    found.insert(key, data);
                }
                Err(e) => {
                    self.local.abandon_fill(&key, ticket);
                    self.stats.record_lookup(Lookup::L1Miss);
                    self.stats.record_error();
                    warn!(key = %key, error = %e, "undecodable remote entry skipped");
                }
            }
        }
        Ok(found)
    }

    // == MSet ==
    /// Batch write: every entry to L1, then one remote multi-set.
    pub async fn mset(&self, items: &HashMap<String, Vec<u8>>, ttl: Duration) -> Result<()> {
        self.stats.record_op();
        let started = Instant::now();
        let result = self.mset_inner(items, ttl).await;
        self.finish_write(started, &result);
        result
    }

    async fn mset_inner(&self, items: &HashMap<String, Vec<u8>>, ttl: Duration) -> Result<()> {
        for (key, data) in items {
            self.validate_key(key)?;
            self.validate_value(data)?;
        }
        let ttl = self.effective_ttl(ttl);

        let mut wire = Vec::with_capacity(items.len());
        for (key, data) in items {
            let entry = self.build_entry(key, data, ttl)?;
            wire.push((key.clone(), self.serializer.serialize(&entry)?));
            self.local.set(key, entry, ttl);
        }
        self.remote.mset(&wire, ttl).await
    }

    // == Set NX ==
    /// Writes only if no live value exists in L2. Returns true if written.
    /// Callers use this to elect a single recomputation per key.
    pub async fn set_nx(&self, key: &str, data: &[u8], ttl: Duration) -> Result<bool> {
        self.stats.record_op();
        let started = Instant::now();
        let result = self.set_nx_inner(key, data, ttl).await;
        self.finish_write(started, &result);
        result
    }

    async fn set_nx_inner(&self, key: &str, data: &[u8], ttl: Duration) -> Result<bool> {
        self.validate_key(key)?;
        self.validate_value(data)?;
        let ttl = self.effective_ttl(ttl);

        let entry = self.build_entry(key, data, ttl)?;
        let wire = self.serializer.serialize(&entry)?;
        let written = self.remote.set_nx(key, &wire, ttl).await?;
        if written {
            self.local.set(key, entry, ttl);
        }
        Ok(written)
    }

    // == Increment ==
    /// Remote-only counter. The stored value is a plain integer, not an entry
    /// envelope, so read it back with `increment(key, 0)` rather than `get`.
    pub async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.stats.record_op();
        let result = match self.validate_key(key) {
            Ok(()) => self.remote.increment(key, delta).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    // == Invalidation ==
    pub async fn invalidate_by_tag(&self, tags: &[String]) -> Result<InvalidationReport> {
        self.stats.record_op();
        let result = self.invalidator.invalidate_tags(tags).await;
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<InvalidationReport> {
        self.stats.record_op();
        let result = match self.validate_pattern(pattern) {
            Ok(()) => self.invalidator.invalidate_pattern(pattern).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    // == Stats ==
    pub fn get_stats(&self) -> ServiceStats {
        self.stats.snapshot()
    }

    /// Zeroes service and remote counters. Operator action.
    pub fn reset_stats(&self) {
        self.stats.reset();
        self.remote.reset_metrics();
    }

    pub fn local_stats(&self) -> LocalStats {
        self.local.stats()
    }

    pub fn remote_metrics(&self) -> RemoteMetrics {
        self.remote.metrics()
    }

    pub fn health(&self) -> HealthStatus {
        self.health.status()
    }

    // == Accessors ==
    pub fn health_monitor(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    pub fn local(&self) -> &Arc<LocalCache> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<RemoteStoreClient> {
        &self.remote
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn background(&self) -> &BackgroundPool {
        &self.background
    }

    /// Waits until queued backfills and access-stat updates have landed.
    pub async fn flush_background(&self) {
        self.background.wait_idle().await;
    }

    // == Internals ==
    fn finish_write<T>(&self, started: Instant, result: &Result<T>) {
        self.stats.record_write(started.elapsed());
        if result.is_err() {
            self.stats.record_error();
        }
    }

    fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() {
            self.limits.default_ttl
        } else {
            ttl
        }
    }

    /// Returns the decoded L1 payload. A corrupt entry is evicted and
    /// reported as a miss.
    fn read_local(&self, key: &str) -> Option<Vec<u8>> {
        let entry = self.local.get(key)?;
        match self.open(entry) {
            Ok(data) => {
                let local = Arc::clone(&self.local);
                let key = key.to_string();
                self.background.submit(move || {
                    local.record_access(&key);
                });
                Some(data)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt local entry evicted");
                self.local.delete(key);
                None
            }
        }
    }

    fn decode_remote(&self, key: &str, raw: &[u8]) -> Result<(Vec<u8>, CacheEntry)> {
        let mut entry = self.serializer.deserialize(raw)?;
        if entry.key != key {
            return Err(CacheError::Codec(format!(
                "stored entry key {} does not match {}",
                entry.key, key
            )));
        }
        let data = if entry.compressed {
            self.compressor.decompress(&entry.payload)?
        } else {
            entry.payload.clone()
        };
        entry.touch();
        Ok((data, entry))
    }

    fn open(&self, entry: CacheEntry) -> Result<Vec<u8>> {
        if entry.compressed {
            self.compressor.decompress(&entry.payload)
        } else {
            Ok(entry.payload)
        }
    }

    fn build_entry(&self, key: &str, data: &[u8], ttl: Duration) -> Result<CacheEntry> {
        let compress =
            self.limits.compression_enabled && data.len() > self.limits.compression_threshold;
        let payload = if compress {
            self.compressor.compress(data)?
        } else {
            data.to_vec()
        };
        Ok(CacheEntry::new(key, payload, ttl, compress))
    }

    fn schedule_backfill(&self, entry: CacheEntry, ticket: FillTicket) {
        let local = Arc::clone(&self.local);
        let ttl = self.limits.default_ttl;
        let key = entry.key.clone();
        let queued = self.background.submit(move || {
            let key = entry.key.clone();
            local.complete_fill(&key, ticket, entry, ttl);
        });
        if !queued {
            self.local.abandon_fill(&key, ticket);
        }
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::Validation("key cannot be empty".to_string()));
        }
        if key.len() > self.limits.max_key_length {
            return Err(CacheError::Validation(format!(
                "key exceeds maximum length of {} bytes",
                self.limits.max_key_length
            )));
        }
        if key.chars().any(char::is_whitespace) {
            return Err(CacheError::Validation(
                "key cannot contain whitespace".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_value(&self, data: &[u8]) -> Result<()> {
        if data.len() > self.limits.max_value_size {
            return Err(CacheError::Validation(format!(
                "value exceeds maximum size of {} bytes",
                self.limits.max_value_size
            )));
        }
        Ok(())
    }

    fn validate_tag(&self, tag: &str) -> Result<()> {
        if tag.is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(CacheError::Validation(format!("invalid tag '{}'", tag)));
        }
        Ok(())
    }

    fn validate_pattern(&self, pattern: &str) -> Result<()> {
        if pattern.is_empty() || pattern.chars().any(char::is_whitespace) {
            return Err(CacheError::Validation(format!(
                "invalid pattern '{}'",
                pattern
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;

    fn service() -> (CacheService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = Config {
            compression_threshold: 64,
            max_key_length: 32,
            max_value_size: 4096,
            ..Config::default()
        };
        let service = CacheService::new(&config, Arc::clone(&store) as Arc<dyn RemoteStore>);
        (service, store)
    }

    #[tokio::test]
    async fn test_validation_rejects_before_io() {
        let (service, store) = service();

        let long = "k".repeat(33);
        for key in ["", "has space", "tab\tkey", long.as_str()] {
            let err = service.set(key, b"v", Duration::ZERO).await.unwrap_err();
            assert!(matches!(err, CacheError::Validation(_)), "{:?}", key);
        }
        let err = service
            .set("big", &vec![0u8; 4097], Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));

        assert_eq!(store.calls(), 0);
        assert_eq!(service.get_stats().errors, 5);
    }

    #[tokio::test]
    async fn test_small_payload_stored_uncompressed() {
        let (service, store) = service();
        service.set("small", b"tiny", Duration::ZERO).await.unwrap();

        let entry = service.local().get("small").unwrap();
        assert!(!entry.compressed);
        assert_eq!(entry.payload, b"tiny");

        let stored: CacheEntry = serde_json::from_slice(&store.raw("small").unwrap()).unwrap();
        assert!(!stored.compressed);
        assert_eq!(stored.ttl, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_large_payload_compressed() {
        let (service, _store) = service();
        let data = "abc".repeat(100).into_bytes();
        service.set("large", &data, Duration::ZERO).await.unwrap();

        let entry = service.local().get("large").unwrap();
        assert!(entry.compressed);
        assert_ne!(entry.payload, data);
        assert_eq!(service.get("large").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_corrupt_local_entry_falls_through_to_remote() {
        let (service, _store) = service();
        service.set("k", b"good", Duration::ZERO).await.unwrap();

        let corrupt = CacheEntry::new("k", b"not gzip".to_vec(), Duration::from_secs(60), true);
        service.local().set("k", corrupt, Duration::from_secs(60));

        assert_eq!(service.get("k").await.unwrap(), b"good");
        let stats = service.get_stats();
        assert_eq!(stats.l2_hits, 1);
        assert_eq!(stats.l1_hits, 0);
    }

    #[tokio::test]
    async fn test_backfill_uses_default_ttl() {
        let (service, store) = service();
        let entry = CacheEntry::new("k", b"v".to_vec(), Duration::from_secs(5), false);
        store.insert_raw("k", serde_json::to_vec(&entry).unwrap(), Duration::from_secs(5));

        assert_eq!(service.get("k").await.unwrap(), b"v");
        service.flush_background().await;

        let backfilled = service.local().get("k").unwrap();
        assert_eq!(backfilled.access_count, 1);
        assert_eq!(backfilled.ttl, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_remote_key_mismatch_is_codec_error() {
        let (service, store) = service();
        let entry = CacheEntry::new("other", b"v".to_vec(), Duration::from_secs(5), false);
        store.insert_raw("k", serde_json::to_vec(&entry).unwrap(), Duration::from_secs(5));

        let err = service.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Codec(_)));
    }

    #[tokio::test]
    async fn test_tag_sets_outlive_entries() {
        let (service, store) = service();
        service
            .set_with_tags("k", b"v", Duration::from_secs(60), &["recipes".to_string()])
            .await
            .unwrap();

        let tag_ttl = store.ttl("app:tag:recipes").unwrap();
        assert!(tag_ttl > Duration::from_secs(3600));
        assert!(tag_ttl <= Duration::from_secs(3660));
    }

    #[tokio::test]
    async fn test_invalid_tag_rejected() {
        let (service, _store) = service();
        let err = service
            .set_with_tags("k", b"v", Duration::ZERO, &["bad tag".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
        assert!(service.local().is_empty());
    }

    #[tokio::test]
    async fn test_set_nx_and_increment() {
        let (service, _store) = service();

        assert!(service.set_nx("lock", b"me", Duration::from_secs(5)).await.unwrap());
        assert!(!service.set_nx("lock", b"you", Duration::from_secs(5)).await.unwrap());
        assert_eq!(service.get("lock").await.unwrap(), b"me");

        assert_eq!(service.increment("hits", 3).await.unwrap(), 3);
        assert_eq!(service.increment("hits", 0).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let (service, _store) = service();
        service.set("k", b"v", Duration::ZERO).await.unwrap();
        let _ = service.get("k").await;

        service.reset_stats();
        assert_eq!(service.get_stats(), ServiceStats::default());
        assert_eq!(service.remote_metrics().total_ops, 0);
    }
}
