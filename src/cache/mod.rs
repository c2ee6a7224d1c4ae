//! Cache Module
//!
//! The in-process layer (L1): bounded LRU with per-entry TTL.

mod entry;
mod local;
mod lru;
mod stats;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use local::{FillTicket, LocalCache};
pub use lru::LruList;
pub use stats::LocalStats;
