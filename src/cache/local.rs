//! Local Cache Module
//!
//! Bounded in-process cache (L1): a HashMap of entries plus an arena LRU
//! list, with per-entry TTL checked lazily on read.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::stats::LocalCounters;
use crate::cache::{CacheEntry, LocalStats, LruList};

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    expires_at: u64,
    node: usize,
}

impl Slot {
    fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Handle for a pending fill of one key from a slower layer.
///
/// A fill only lands if no write or invalidation touched the key between
/// [`LocalCache::begin_fill`] and [`LocalCache::complete_fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<String, Slot>,
    lru: LruList,
    fills: HashMap<String, u64>,
    next_fill: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.map.remove(key)?;
        self.lru.remove(slot.node);
        Some(slot.entry)
    }

    /// Removes `key` and cancels any fill pending for it.
    fn invalidate(&mut self, key: &str) -> Option<CacheEntry> {
        self.fills.remove(key);
        self.remove(key)
    }

    fn remove_where(&mut self, mut pred: impl FnMut(&str, &Slot) -> bool) -> usize {
        let doomed: Vec<String> = self
            .map
            .iter()
            .filter(|(key, slot)| pred(key, slot))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }
}

// == Local Cache ==
/// Thread-safe bounded LRU cache with TTL.
///
/// The map is the source of truth; the list only encodes recency. Every map
/// entry owns exactly one list node. A single reader/writer lock guards both
/// and is never held across I/O.
#[derive(Debug)]
pub struct LocalCache {
    inner: RwLock<Inner>,
    counters: LocalCounters,
    capacity: usize,
}

impl LocalCache {
    // == Constructor ==
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            counters: LocalCounters::default(),
            capacity: capacity.max(1),
        }
    }

    // == Get ==
    /// Returns a clone of the live entry for `key` and marks it most recently used.
    ///
    /// The lookup runs under an upgradable read; the lock is upgraded only to
    /// reorder the list or to drop an expired entry.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = current_timestamp_ms();
        let inner = self.inner.upgradable_read();

        let Some(slot) = inner.map.get(key) else {
            self.counters.record_miss();
            return None;
        };
        let expired = slot.is_expired(now);

        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        if expired {
            inner.remove(key);
            self.counters.record_expirations(1);
            self.counters.record_miss();
            debug!(key = %key, "local entry expired on read");
            return None;
        }

        let slot = inner.map.get(key)?;
        let (node, entry) = (slot.node, slot.entry.clone());
        inner.lru.move_to_front(node);
        self.counters.record_hit();
        Some(entry)
    }

    // == Set ==
    /// Stores an entry under `key` for `ttl`.
    ///
    /// An existing key is updated in place and moved to the front. A new key
    /// is inserted at the front, then the back of the list is evicted until
    /// the cache is within capacity. The entry just inserted is never evicted.
    pub fn set(&self, key: &str, entry: CacheEntry, ttl: Duration) {
        let mut inner = self.inner.write();
        inner.fills.remove(key);
        self.insert(&mut inner, key, entry, ttl);
    }

    fn insert(&self, inner: &mut Inner, key: &str, entry: CacheEntry, ttl: Duration) {
        let expires_at = current_timestamp_ms().saturating_add(ttl.as_millis() as u64);

        if let Some(slot) = inner.map.get_mut(key) {
            slot.entry = entry;
            slot.expires_at = expires_at;
            let node = slot.node;
            inner.lru.move_to_front(node);
            return;
        }

        let node = inner.lru.push_front(key.to_string());
        inner.map.insert(
            key.to_string(),
            Slot {
                entry,
                expires_at,
                node,
            },
        );

        while inner.map.len() > self.capacity {
            let Some(victim) = inner.lru.pop_back() else {
                break;
            };
            inner.map.remove(&victim);
            self.counters.record_eviction();
            debug!(key = %victim, "evicted least recently used entry");
        }
    }

    // == Fills ==
    /// Opens a fill for `key`, to be completed once the value has been read
    /// from the slower layer.
    pub fn begin_fill(&self, key: &str) -> FillTicket {
        let mut inner = self.inner.write();
        // Fills abandoned without cleanup (a cancelled caller) must not pile up
        if inner.fills.len() >= self.capacity {
            inner.fills.clear();
        }
        inner.next_fill += 1;
        let id = inner.next_fill;
        inner.fills.insert(key.to_string(), id);
        FillTicket(id)
    }

    /// Stores `entry` only if `ticket` is still the open fill for `key`.
    ///
    /// Any [`set`](Self::set), delete or invalidation of the key since the
    /// ticket was issued cancels the fill. Returns true if the entry landed.
    pub fn complete_fill(
        &self,
        key: &str,
        ticket: FillTicket,
        entry: CacheEntry,
        ttl: Duration,
    ) -> bool {
        let mut inner = self.inner.write();
        if inner.fills.get(key) != Some(&ticket.0) {
            debug!(key = %key, "stale fill dropped");
            return false;
        }
        inner.fills.remove(key);
        self.insert(&mut inner, key, entry, ttl);
        true
    }

    /// Closes a fill that will never complete.
    pub fn abandon_fill(&self, key: &str, ticket: FillTicket) {
        let mut inner = self.inner.write();
        if inner.fills.get(key) == Some(&ticket.0) {
            inner.fills.remove(key);
        }
    }

    // == Delete ==
    /// Removes `key`. Returns true if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.write().invalidate(key).is_some()
    }

    // == Exists ==
    /// Returns true if `key` holds a live entry. Does not affect recency.
    pub fn exists(&self, key: &str) -> bool {
        let now = current_timestamp_ms();
        self.inner
            .read()
            .map
            .get(key)
            .is_some_and(|slot| !slot.is_expired(now))
    }

    // == Record Access ==
    /// Bumps the access statistics of a live entry. Returns false if absent.
    pub fn record_access(&self, key: &str) -> bool {
        match self.inner.write().map.get_mut(key) {
            Some(slot) => {
                slot.entry.touch();
                true
            }
            None => false,
        }
    }

    // == Invalidate Pattern ==
    /// Removes keys matching `pattern` and returns how many were removed.
    ///
    /// Supports an exact key or a single trailing `*` prefix match only.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut inner = self.inner.write();
        match pattern.strip_suffix('*') {
            Some(prefix) => {
                inner.fills.retain(|key, _| !key.starts_with(prefix));
                inner.remove_where(|key, _| key.starts_with(prefix))
            }
            None => usize::from(inner.invalidate(pattern).is_some()),
        }
    }

    // == Invalidate Tag ==
    /// Removes entries whose own tag list carries `tag`.
    ///
    /// Pending fills are not cancelled here since their tags are unknown
    /// until they land; callers delete the tag's members by key as well.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        self.inner
            .write()
            .remove_where(|_, slot| slot.entry.has_tag(tag))
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let removed = self
            .inner
            .write()
            .remove_where(|_, slot| slot.is_expired(now));
        self.counters.record_expirations(removed as u64);
        removed
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.map.clear();
        inner.lru.clear();
        inner.fills.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // == Stats ==
    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> LocalStats {
        self.counters.snapshot(self.len(), self.capacity)
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.inner.read().lru.iter().map(str::to_string).collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn entry(key: &str, value: &str) -> CacheEntry {
        CacheEntry::new(key, value.as_bytes().to_vec(), TTL, false)
    }

    fn put(cache: &LocalCache, key: &str, value: &str) {
        cache.set(key, entry(key, value), TTL);
    }

    fn value(cache: &LocalCache, key: &str) -> Option<String> {
        cache
            .get(key)
            .map(|e| String::from_utf8(e.payload).unwrap())
    }

    #[test]
    fn test_set_and_get() {
        let cache = LocalCache::new(10);
        put(&cache, "key1", "value1");

        assert_eq!(value(&cache, "key1").as_deref(), Some("value1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_missing_counts_miss() {
        let cache = LocalCache::new(10);
        assert!(cache.get("nope").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_lru_touch_on_get_protects_key() {
        let cache = LocalCache::new(2);
        put(&cache, "A", "a");
        put(&cache, "B", "b");
        cache.get("A");
        put(&cache, "C", "c");

        assert!(cache.exists("A"));
        assert!(!cache.exists("B"));
        assert!(cache.exists("C"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_keeps_single_entry_at_front() {
        let cache = LocalCache::new(3);
        put(&cache, "a", "v1");
        put(&cache, "b", "x");
        put(&cache, "a", "v2");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys_by_recency(), vec!["a", "b"]);
        assert_eq!(value(&cache, "a").as_deref(), Some("v2"));
    }

    #[test]
    fn test_capacity_one_keeps_newest() {
        let cache = LocalCache::new(1);
        put(&cache, "a", "1");
        put(&cache, "b", "2");

        assert_eq!(cache.len(), 1);
        assert!(cache.exists("b"));
    }

    #[test]
    fn test_ttl_expiry_removes_on_read() {
        let cache = LocalCache::new(10);
        cache.set("short", entry("short", "v"), Duration::from_millis(30));
        put(&cache, "long", "v");
        assert_eq!(cache.len(), 2);

        sleep(Duration::from_millis(60));

        assert!(cache.get("short").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_exists_ignores_expired() {
        let cache = LocalCache::new(10);
        cache.set("k", entry("k", "v"), Duration::from_millis(20));
        sleep(Duration::from_millis(40));
        assert!(!cache.exists("k"));
    }

    #[test]
    fn test_delete() {
        let cache = LocalCache::new(10);
        put(&cache, "k", "v");

        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert!(cache.is_empty());
        assert!(cache.keys_by_recency().is_empty());
    }

    #[test]
    fn test_invalidate_pattern_prefix() {
        let cache = LocalCache::new(10);
        put(&cache, "app:recipe:1", "a");
        put(&cache, "app:recipe:2", "b");
        put(&cache, "app:user:1", "c");

        assert_eq!(cache.invalidate_pattern("app:recipe:*"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.exists("app:user:1"));
    }

    #[test]
    fn test_invalidate_pattern_exact_only() {
        let cache = LocalCache::new(10);
        put(&cache, "app:recipe:1", "a");
        put(&cache, "app:recipe:10", "b");

        assert_eq!(cache.invalidate_pattern("app:recipe:1"), 1);
        assert!(cache.exists("app:recipe:10"));
        // Mid-string wildcards are literal
        assert_eq!(cache.invalidate_pattern("app:*:10"), 0);
    }

    #[test]
    fn test_invalidate_tag() {
        let cache = LocalCache::new(10);
        let tagged = entry("t", "v").with_tags(vec!["recipes".to_string()]);
        cache.set("t", tagged, TTL);
        put(&cache, "u", "v");

        assert_eq!(cache.invalidate_tag("recipes"), 1);
        assert!(!cache.exists("t"));
        assert!(cache.exists("u"));
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = LocalCache::new(10);
        cache.set("a", entry("a", "1"), Duration::from_millis(20));
        cache.set("b", entry("b", "2"), Duration::from_millis(20));
        put(&cache, "c", "3");

        sleep(Duration::from_millis(50));

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.keys_by_recency(), vec!["c"]);
    }

    #[test]
    fn test_fill_lands_when_key_untouched() {
        let cache = LocalCache::new(10);
        let ticket = cache.begin_fill("k");

        assert!(cache.complete_fill("k", ticket, entry("k", "from_l2"), TTL));
        assert_eq!(value(&cache, "k").as_deref(), Some("from_l2"));
    }

    #[test]
    fn test_set_cancels_pending_fill() {
        let cache = LocalCache::new(10);
        let ticket = cache.begin_fill("k");
        put(&cache, "k", "v2");

        assert!(!cache.complete_fill("k", ticket, entry("k", "v1"), TTL));
        assert_eq!(value(&cache, "k").as_deref(), Some("v2"));
    }

    #[test]
    fn test_delete_and_pattern_cancel_pending_fills() {
        let cache = LocalCache::new(10);
        let deleted = cache.begin_fill("app:user:1");
        let matched = cache.begin_fill("app:recipe:1");
        cache.delete("app:user:1");
        cache.invalidate_pattern("app:recipe:*");

        assert!(!cache.complete_fill("app:user:1", deleted, entry("a", "v"), TTL));
        assert!(!cache.complete_fill("app:recipe:1", matched, entry("b", "v"), TTL));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_newer_fill_supersedes_older() {
        let cache = LocalCache::new(10);
        let first = cache.begin_fill("k");
        let second = cache.begin_fill("k");

        assert!(!cache.complete_fill("k", first, entry("k", "old"), TTL));
        cache.abandon_fill("k", first);
        assert!(cache.complete_fill("k", second, entry("k", "new"), TTL));
        assert_eq!(value(&cache, "k").as_deref(), Some("new"));
    }

    #[test]
    fn test_record_access() {
        let cache = LocalCache::new(10);
        put(&cache, "k", "v");

        assert!(cache.record_access("k"));
        assert!(cache.record_access("k"));
        assert!(!cache.record_access("missing"));
        assert_eq!(cache.get("k").unwrap().access_count, 2);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(LocalCache::new(64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 31 + i) % 100);
                        cache.set(&key, entry(&key, "v"), TTL);
                        cache.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
        assert_eq!(cache.keys_by_recency().len(), cache.len());
    }
}
