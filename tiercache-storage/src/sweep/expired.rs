//! Batch eviction of records whose own lifetime has elapsed.

use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use tiercache_core::now_epoch_seconds;

use crate::memory::MemoryStore;
use crate::persistence::Persistence;

/// Scans the durable tier and evicts every expired record from both tiers.
///
/// Expiry uses the lifetime stored in each record, not the caller's. Records
/// that fail to decode are left alone.
pub struct EvictExpiredRecords {
    memory: Arc<MemoryStore>,
    persistence: Arc<dyn Persistence>,
}

impl EvictExpiredRecords {
    pub fn new(memory: Arc<MemoryStore>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            memory,
            persistence,
        }
    }

    /// Lazily evict, yielding each evicted key. Ends after the full scan.
    pub fn stream(&self) -> impl Stream<Item = String> + Send + '_ {
        stream::once(self.durable_keys())
            .flat_map(stream::iter)
            .filter_map(move |key| async move { self.evict_if_expired(&key).await.then_some(key) })
    }

    /// Run the whole sweep and collect the evicted keys.
    pub async fn run(&self) -> Vec<String> {
        let started = std::time::Instant::now();
        tracing::info!("Expired records sweep started");
        let evicted: Vec<String> = self.stream().collect().await;
        tracing::info!(
            evicted = evicted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Expired records sweep finished"
        );
        evicted
    }

    async fn durable_keys(&self) -> Vec<String> {
        self.persistence.all_keys().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to enumerate persisted keys");
            Vec::new()
        })
    }

    async fn evict_if_expired(&self, key: &str) -> bool {
        let record = match self.persistence.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping unreadable record");
                return false;
            }
        };
        if !record.has_expired(now_epoch_seconds()) {
            return false;
        }

        self.memory.delete(key);
        match self.persistence.delete(key).await {
            Ok(()) => {
                tracing::debug!(key = %key, "Evicted expired record");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to delete expired record");
                false
            }
        }
    }
}
