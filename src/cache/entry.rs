//! Cache Entry Module
//!
//! Defines the entry record shared by both layers. The same struct is the
//! stored envelope on the remote store, so its serde layout is part of the
//! wire format.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A single cached payload with its metadata.
///
/// `payload` is always the wire form: when `compressed` is true it holds
/// gzip bytes and callers decompress on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key this entry was written under
    pub key: String,
    /// Stored bytes, post-compression
    #[serde(rename = "data", with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// TTL the entry was written with, stored as whole milliseconds
    #[serde(with = "ttl_millis")]
    pub ttl: Duration,
    /// Write time
    pub created_at: DateTime<Utc>,
    /// Last read time
    pub last_access: DateTime<Utc>,
    /// Number of reads served from this entry
    pub access_count: u64,
    /// Tags the entry was registered under
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether `payload` is compressed
    pub compressed: bool,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a fresh entry with zeroed access statistics.
    pub fn new(
        key: impl Into<String>,
        payload: Vec<u8>,
        ttl: Duration,
        compressed: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            payload,
            ttl,
            created_at: now,
            last_access: now,
            access_count: 0,
            tags: Vec::new(),
            compressed,
        }
    }

    /// Attaches tags to the entry.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    // == Touch ==
    /// Records one read against the entry.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_access = Utc::now();
    }

    /// Returns true if the entry carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod ttl_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(
            "app:recipe:1",
            b"soup".to_vec(),
            Duration::from_secs(60),
            false,
        );

        assert_eq!(entry.key, "app:recipe:1");
        assert_eq!(entry.payload, b"soup");
        assert_eq!(entry.access_count, 0);
        assert!(entry.tags.is_empty());
        assert!(!entry.compressed);
    }

    #[test]
    fn test_touch_updates_access_stats() {
        let mut entry = CacheEntry::new("k", vec![1], Duration::from_secs(1), false);
        let before = entry.last_access;

        entry.touch();
        entry.touch();

        assert_eq!(entry.access_count, 2);
        assert!(entry.last_access >= before);
    }

    #[test]
    fn test_envelope_field_names() {
        let entry = CacheEntry::new("k", b"hi".to_vec(), Duration::from_secs(90), false)
            .with_tags(vec!["recipes".to_string()]);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["key"], "k");
        assert_eq!(json["data"], "aGk=");
        assert_eq!(json["ttl"], 90_000);
        assert_eq!(json["tags"][0], "recipes");
        assert_eq!(json["compressed"], false);
        assert!(json.get("created_at").is_some());
        assert!(json.get("access_count").is_some());
    }

    #[test]
    fn test_sub_second_ttl_survives_envelope() {
        let entry = CacheEntry::new("k", vec![], Duration::from_millis(250), false);
        let json = serde_json::to_string(&entry).unwrap();
        let decoded: CacheEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.ttl, Duration::from_millis(250));
    }

    #[test]
    fn test_has_tag() {
        let entry = CacheEntry::new("k", vec![], Duration::from_secs(1), false)
            .with_tags(vec!["a".to_string(), "b".to_string()]);
        assert!(entry.has_tag("b"));
        assert!(!entry.has_tag("c"));
    }
}
