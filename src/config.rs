//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for every key this service writes
    pub key_prefix: String,
    /// TTL for writes without an explicit TTL, and for L1 backfills
    pub default_ttl: Duration,
    /// Per-domain TTL overrides, keyed by domain name
    pub domain_ttls: HashMap<String, Duration>,
    /// Maximum number of entries held by the local cache
    pub local_capacity: usize,
    /// Whether payloads above the threshold are gzip-compressed
    pub compression_enabled: bool,
    /// Payloads strictly larger than this many bytes are compressed
    pub compression_threshold: usize,
    /// Maximum key length in bytes
    pub max_key_length: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// Keys deleted per remote command during invalidation
    pub invalidation_batch_size: usize,
    /// Upper bound on a whole invalidation call
    pub invalidation_timeout: Duration,
    /// Consecutive remote failures before the breaker opens
    pub breaker_max_failures: u32,
    /// How long the breaker stays open before probing
    pub breaker_timeout: Duration,
    /// Redis connection URL; `None` selects the in-process remote store
    pub redis_url: Option<String>,
    /// Deadline applied to every remote call
    pub command_timeout: Duration,
    /// Interval between health pings
    pub health_check_interval: Duration,
    /// Interval between local expiry sweeps
    pub cleanup_interval: Duration,
    /// Number of background workers for backfill and access stats
    pub background_workers: usize,
    /// Capacity of the background job queue
    pub background_queue: usize,
    /// HTTP server port for the admin surface
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_KEY_PREFIX` (default: app)
    /// - `CACHE_DEFAULT_TTL_SECS` (default: 300)
    /// - `CACHE_DOMAIN_TTLS` e.g. `recipe=3600,session=1800` (default: empty)
    /// - `CACHE_LOCAL_CAPACITY` (default: 10000)
    /// - `CACHE_COMPRESSION_ENABLED` (default: true)
    /// - `CACHE_COMPRESSION_THRESHOLD` (default: 1024)
    /// - `CACHE_MAX_KEY_LENGTH` (default: 250)
    /// - `CACHE_MAX_VALUE_SIZE` (default: 1048576)
    /// - `CACHE_INVALIDATION_BATCH_SIZE` (default: 100)
    /// - `CACHE_INVALIDATION_TIMEOUT_SECS` (default: 30)
    /// - `CACHE_BREAKER_MAX_FAILURES` (default: 5)
    /// - `CACHE_BREAKER_TIMEOUT_SECS` (default: 30)
    /// - `REDIS_URL` (default: unset)
    /// - `REDIS_COMMAND_TIMEOUT_MS` (default: 500)
    /// - `CACHE_HEALTH_INTERVAL_SECS` (default: 30)
    /// - `CACHE_CLEANUP_INTERVAL_SECS` (default: 60)
    /// - `CACHE_BACKGROUND_WORKERS` (default: 2)
    /// - `CACHE_BACKGROUND_QUEUE` (default: 1024)
    /// - `SERVER_PORT` (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            default_ttl: secs_var("CACHE_DEFAULT_TTL_SECS", defaults.default_ttl),
            domain_ttls: env::var("CACHE_DOMAIN_TTLS")
                .map(|raw| parse_domain_ttls(&raw))
                .unwrap_or_default(),
            local_capacity: parsed_var("CACHE_LOCAL_CAPACITY", defaults.local_capacity),
            compression_enabled: parsed_var(
                "CACHE_COMPRESSION_ENABLED",
                defaults.compression_enabled,
            ),
            compression_threshold: parsed_var(
                "CACHE_COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            ),
            max_key_length: parsed_var("CACHE_MAX_KEY_LENGTH", defaults.max_key_length),
            max_value_size: parsed_var("CACHE_MAX_VALUE_SIZE", defaults.max_value_size),
            invalidation_batch_size: parsed_var(
                "CACHE_INVALIDATION_BATCH_SIZE",
                defaults.invalidation_batch_size,
            ),
            invalidation_timeout: secs_var(
                "CACHE_INVALIDATION_TIMEOUT_SECS",
                defaults.invalidation_timeout,
            ),
            breaker_max_failures: parsed_var(
                "CACHE_BREAKER_MAX_FAILURES",
                defaults.breaker_max_failures,
            ),
            breaker_timeout: secs_var("CACHE_BREAKER_TIMEOUT_SECS", defaults.breaker_timeout),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            command_timeout: env::var("REDIS_COMMAND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.command_timeout),
            health_check_interval: secs_var(
                "CACHE_HEALTH_INTERVAL_SECS",
                defaults.health_check_interval,
            ),
            cleanup_interval: secs_var("CACHE_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval),
            background_workers: parsed_var("CACHE_BACKGROUND_WORKERS", defaults.background_workers),
            background_queue: parsed_var("CACHE_BACKGROUND_QUEUE", defaults.background_queue),
            server_port: parsed_var("SERVER_PORT", defaults.server_port),
        }
    }

    /// Resolves the TTL for a domain, falling back to the default TTL.
    pub fn ttl_for(&self, domain: &str) -> Duration {
        self.domain_ttls
            .get(domain)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: "app".to_string(),
            default_ttl: Duration::from_secs(300),
            domain_ttls: HashMap::new(),
            local_capacity: 10_000,
            compression_enabled: true,
            compression_threshold: 1024,
            max_key_length: 250,
            max_value_size: 1024 * 1024,
            invalidation_batch_size: 100,
            invalidation_timeout: Duration::from_secs(30),
            breaker_max_failures: 5,
            breaker_timeout: Duration::from_secs(30),
            redis_url: None,
            command_timeout: Duration::from_millis(500),
            health_check_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
            background_workers: 2,
            background_queue: 1024,
            server_port: 3000,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn secs_var(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Parses `domain=secs` pairs separated by commas. Malformed pairs are skipped.
fn parse_domain_ttls(raw: &str) -> HashMap<String, Duration> {
    raw.split(',')
        .filter_map(|pair| {
            let (domain, secs) = pair.split_once('=')?;
            let secs: u64 = secs.trim().parse().ok()?;
            let domain = domain.trim();
            (!domain.is_empty()).then(|| (domain.to_string(), Duration::from_secs(secs)))
        })
        .collect()
}
