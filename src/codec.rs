//! Codec Module
//!
//! Pluggable entry serialization and payload compression used by every layer.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Serializer ==
/// Encodes the stored entry envelope to bytes and back.
pub trait Serializer: Send + Sync {
    fn serialize(&self, entry: &CacheEntry) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<CacheEntry>;
}

/// JSON envelope encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(entry)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<CacheEntry> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// == Compressor ==
/// Compresses payloads above the configured threshold.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Gzip via flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    /// Creates a compressor at the given level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CacheError::Codec(format!("gzip decode failed: {}", e)))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_gzip_roundtrip() {
        let gzip = GzipCompressor::default();
        let data = "recipe ".repeat(500).into_bytes();

        let packed = gzip.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(gzip.decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_gzip_empty_payload() {
        let gzip = GzipCompressor::new(1);
        let packed = gzip.compress(&[]).unwrap();
        assert!(gzip.decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_decompress_garbage_is_codec_error() {
        let err = GzipCompressor::default()
            .decompress(b"definitely not gzip")
            .unwrap_err();
        assert!(matches!(err, CacheError::Codec(_)));
    }

    #[test]
    fn test_json_serializer_roundtrip() {
        let payload = vec![0, 159, 146, 150];
        let entry = CacheEntry::new("app:recipe:1", payload, Duration::from_secs(60), true)
            .with_tags(vec!["recipes".to_string()]);

        let bytes = JsonSerializer.serialize(&entry).unwrap();
        let decoded = JsonSerializer.deserialize(&bytes).unwrap();

        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_json_serializer_rejects_garbage() {
        let err = JsonSerializer.deserialize(b"{not json").unwrap_err();
        assert!(matches!(err, CacheError::Codec(_)));
    }
}
