//! Cache Invalidator Module
//!
//! Tag-based and pattern-based bulk invalidation across both layers.
//! Invalidation is best-effort and idempotent: a failed batch or tag is
//! recorded in the report and the remaining work still runs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::LocalCache;
use crate::error::{CacheError, Result};
use crate::keys::KeyBuilder;
use crate::remote::RemoteStoreClient;

// == Invalidation Report ==
/// What one invalidation call did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvalidationReport {
    /// Keys resolved from tag sets or the remote scan
    pub keys_found: usize,
    /// Entries removed from the local cache
    pub l1_removed: usize,
    /// Keys the remote store reported as deleted
    pub l2_removed: u64,
    /// Remote delete batches that failed
    pub failed_batches: usize,
    pub errors: Vec<String>,
}

impl InvalidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// == Cache Invalidator ==
pub struct CacheInvalidator {
    local: Arc<LocalCache>,
    remote: Arc<RemoteStoreClient>,
    keys: KeyBuilder,
    batch_size: usize,
    timeout: Duration,
}

impl CacheInvalidator {
    pub fn new(
        local: Arc<LocalCache>,
        remote: Arc<RemoteStoreClient>,
        keys: KeyBuilder,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            keys,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    // == Tag Invalidation ==
    /// For each tag: read the tag set, drop its members from L1 and, in
    /// batches, from L2, then drop the tag set itself.
    ///
    /// The tag set is kept when any member batch failed, so a retry can
    /// still find the surviving keys.
    pub async fn invalidate_tags(&self, tags: &[String]) -> Result<InvalidationReport> {
        let mut report = InvalidationReport::default();
        let run = async {
            for tag in tags {
                self.invalidate_tag(tag, &mut report).await;
            }
        };

        if tokio::time::timeout(self.timeout, run).await.is_err() {
            warn!(?tags, ?report, "tag invalidation timed out");
            return Err(CacheError::Remote(format!(
                "tag invalidation timed out after {:?}",
                self.timeout
            )));
        }

        info!(
            tags = tags.len(),
            keys_found = report.keys_found,
            l1_removed = report.l1_removed,
            l2_removed = report.l2_removed,
            failed_batches = report.failed_batches,
            "tag invalidation finished"
        );
        Ok(report)
    }

    async fn invalidate_tag(&self, tag: &str, report: &mut InvalidationReport) {
        // L1 entries carry their own tags; this clears them even when the
        // remote tag set cannot be read
        report.l1_removed += self.local.invalidate_tag(tag);

        let tag_key = self.keys.tag(tag);
        let members = match self.remote.tag_members(&tag_key).await {
            Ok(members) => members,
            Err(e) => {
                warn!(tag = %tag, error = %e, "failed to read tag set");
                report.errors.push(format!("tag {}: {}", tag, e));
                return;
            }
        };
        report.keys_found += members.len();

        for key in &members {
            if self.local.delete(key) {
                report.l1_removed += 1;
            }
        }

        let failed_before = report.failed_batches;
        self.delete_batches(&members, report).await;
        self.drop_pending_fills(&members);

        if report.failed_batches == failed_before {
            if let Err(e) = self.remote.delete(&[tag_key]).await {
                warn!(tag = %tag, error = %e, "failed to delete tag set");
                report.errors.push(format!("tag set {}: {}", tag, e));
            }
        }
    }

    // == Pattern Invalidation ==
    /// Scans L2 for `pattern`, invalidates the same pattern in L1, drops
    /// every scanned key from L1, then batch-deletes the scanned keys from L2.
    ///
    /// The L1 pattern pass only understands exact keys and a trailing `*`;
    /// other globs are cleared from L1 through the scanned keys, so an L1
    /// entry whose key is absent from L2 survives a mid-string glob.
    ///
    /// Keys written while the scan runs may or may not be included.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<InvalidationReport> {
        let mut report = InvalidationReport::default();
        let run = self.run_pattern(pattern, &mut report);

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(())) => {
                info!(
                    pattern = %pattern,
                    keys_found = report.keys_found,
                    l1_removed = report.l1_removed,
                    l2_removed = report.l2_removed,
                    failed_batches = report.failed_batches,
                    "pattern invalidation finished"
                );
                Ok(report)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(pattern = %pattern, "pattern invalidation timed out");
                Err(CacheError::Remote(format!(
                    "pattern invalidation timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    async fn run_pattern(&self, pattern: &str, report: &mut InvalidationReport) -> Result<()> {
        let scanned = self.remote.scan_keys(pattern, self.batch_size).await;
        report.l1_removed += self.local.invalidate_pattern(pattern);

        let keys = match scanned {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "remote scan failed, only L1 invalidated");
                return Err(e);
            }
        };
        report.keys_found += keys.len();
        for key in &keys {
            if self.local.delete(key) {
                report.l1_removed += 1;
            }
        }
        self.delete_batches(&keys, report).await;
        self.drop_pending_fills(&keys);
        Ok(())
    }

    /// Clears anything a concurrent read backfilled into L1 while the remote
    /// deletes were in flight.
    fn drop_pending_fills(&self, keys: &[String]) {
        for key in keys {
            self.local.delete(key);
        }
    }

    async fn delete_batches(&self, keys: &[String], report: &mut InvalidationReport) {
        for batch in keys.chunks(self.batch_size) {
            match self.remote.delete(batch).await {
                Ok(removed) => report.l2_removed += removed,
                Err(e) => {
                    warn!(batch_len = batch.len(), error = %e, "invalidation batch failed");
                    report.failed_batches += 1;
                    report.errors.push(e.to_string());
                }
            }
        }
    }
}
