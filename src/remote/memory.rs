//! In-process remote store.
//!
//! Mirrors the Redis semantics the client relies on (per-key expiry, set
//! objects, glob scans). Backs the binary when no Redis URL is configured
//! and serves as the test double, including fault and latency injection.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CacheError, Result};
use crate::remote::RemoteStore;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Item {
    value: Value,
    expires_at: Option<Instant>,
}

impl Item {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Item>>,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with a remote error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every subsequent call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of calls that reached the store.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.items.lock().values().filter(|i| i.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes under `key`, bypassing fault injection.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        match self.items.lock().get(key) {
            Some(Item {
                value: Value::Bytes(bytes),
                expires_at,
            }) if expires_at.map_or(true, |at| now < at) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Remaining lifetime of `key`, bypassing fault injection.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.items
            .lock()
            .get(key)
            .and_then(|item| item.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Writes raw bytes, bypassing fault injection.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.items.lock().insert(
            key.to_string(),
            Item {
                value: Value::Bytes(value),
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Remote("connection refused".to_string()));
        }
        Ok(())
    }

    fn read_bytes(
        items: &mut HashMap<String, Item>,
        key: &str,
        now: Instant,
    ) -> Result<Option<Vec<u8>>> {
        match items.get(key) {
            Some(item) if !item.is_live(now) => {
                items.remove(key);
                Ok(None)
            }
            Some(Item {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    fn write_bytes(items: &mut HashMap<String, Item>, key: &str, value: &[u8], ttl: Duration) {
        items.insert(
            key.to_string(),
            Item {
                value: Value::Bytes(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }
}

fn wrong_type() -> CacheError {
    CacheError::Remote(
        "WRONGTYPE operation against a key holding the wrong kind of value".to_string(),
    )
}

/// Redis-style glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.enter().await?;
        Self::read_bytes(&mut self.items.lock(), key, Instant::now())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.enter().await?;
        Self::write_bytes(&mut self.items.lock(), key, value, ttl);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.enter().await?;
        let now = Instant::now();
        let mut items = self.items.lock();
        if items.get(key).is_some_and(|item| item.is_live(now)) {
            return Ok(false);
        }
        Self::write_bytes(&mut items, key, value, ttl);
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.enter().await?;
        let now = Instant::now();
        let mut items = self.items.lock();
        let removed = keys
            .iter()
            .filter_map(|key| items.remove(key))
            .filter(|item| item.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>> {
        self.enter().await?;
        let now = Instant::now();
        let items = self.items.lock();
        Ok(keys
            .iter()
            .map(|key| items.get(key).is_some_and(|item| item.is_live(now)))
            .collect())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.enter().await?;
        let now = Instant::now();
        let mut items = self.items.lock();
        // MGET yields nil for keys of the wrong type rather than failing
        Ok(keys
            .iter()
            .map(|key| Self::read_bytes(&mut items, key, now).ok().flatten())
            .collect())
    }

    async fn mset(&self, items: &[(String, Vec<u8>)], ttl: Duration) -> Result<()> {
        self.enter().await?;
        let mut store = self.items.lock();
        for (key, value) in items {
            Self::write_bytes(&mut store, key, value, ttl);
        }
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        self.enter().await?;
        let now = Instant::now();
        let mut items = self.items.lock();

        let (current, expires_at) = match items.get(key) {
            Some(item) if item.is_live(now) => match &item.value {
                Value::Bytes(bytes) => {
                    let parsed = std::str::from_utf8(bytes)
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| {
                            CacheError::Remote(
                                "value is not an integer or out of range".to_string(),
                            )
                        })?;
                    (parsed, item.expires_at)
                }
                Value::Set(_) => return Err(wrong_type()),
            },
            _ => (0, None),
        };

        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::Remote("increment or decrement would overflow".to_string())
        })?;
        items.insert(
            key.to_string(),
            Item {
                value: Value::Bytes(next.to_string().into_bytes()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn scan(&self, pattern: &str, _count: usize) -> Result<Vec<String>> {
        self.enter().await?;
        let now = Instant::now();
        Ok(self
            .items
            .lock()
            .iter()
            .filter(|(key, item)| item.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn add_to_sets(&self, member: &str, set_keys: &[String], ttl: Duration) -> Result<()> {
        self.enter().await?;
        let now = Instant::now();
        let mut items = self.items.lock();
        for set_key in set_keys {
            let item = items
                .entry(set_key.clone())
                .and_modify(|item| {
                    if !item.is_live(now) {
                        item.value = Value::Set(HashSet::new());
                    }
                })
                .or_insert_with(|| Item {
                    value: Value::Set(HashSet::new()),
                    expires_at: None,
                });
            match &mut item.value {
                Value::Set(members) => {
                    members.insert(member.to_string());
                }
                Value::Bytes(_) => return Err(wrong_type()),
            }
            let requested = now + ttl;
            item.expires_at = Some(match item.expires_at {
                Some(at) if at > requested => at,
                _ => requested,
            });
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        self.enter().await?;
        let now = Instant::now();
        match self.items.lock().get(set_key) {
            Some(item) if !item.is_live(now) => Ok(Vec::new()),
            Some(Item {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type()),
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.enter().await
    }
}
