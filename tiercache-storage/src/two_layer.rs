//! Tiered retrieval and eviction.

use std::sync::Arc;

use tiercache_core::{
    match_dynamic_key, match_dynamic_key_group, match_provider_key, now_epoch_seconds,
    ConfigurationError, Descriptor, DynamicKeyGroup, LifeCache, PersistenceError, Record, Source,
    StorageKey,
};

use crate::memory::MemoryStore;
use crate::persistence::Persistence;
use crate::save_record::SaveRecord;
use crate::stats::{CacheStats, StatsCounters};
use crate::Cacheable;

/// Memory tier in front of a durable tier.
///
/// Lookups go memory, then persistence, then miss. A durable hit is copied
/// back into memory so the next lookup stays in process. Persistence failures
/// on the read path are logged and reported as misses.
pub struct TwoLayerCache {
    memory: Arc<MemoryStore>,
    persistence: Arc<dyn Persistence>,
    save_record: SaveRecord,
    stats: StatsCounters,
}

impl TwoLayerCache {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self::with_memory(Arc::new(MemoryStore::new()), persistence)
    }

    pub fn with_memory(memory: Arc<MemoryStore>, persistence: Arc<dyn Persistence>) -> Self {
        let save_record = SaveRecord::new(Arc::clone(&memory), Arc::clone(&persistence));
        Self {
            memory,
            persistence,
            save_record,
            stats: StatsCounters::default(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Look a key up in both tiers.
    ///
    /// Expiry is judged against `life_cache`, the lifetime the caller asks for
    /// now. Expired records are misses unless `use_expired_data` is set, in
    /// which case they are returned with the source of the tier that held them.
    /// Expired memory entries are left in place for the next save to overwrite.
    pub async fn retrieve<V: Cacheable>(
        &self,
        key: &StorageKey,
        life_cache: Option<&LifeCache>,
        use_expired_data: bool,
    ) -> Option<Record<V>> {
        self.stats.retrieval();
        let now = now_epoch_seconds();

        if let Some(record) = self.memory.get::<V>(key.as_str()) {
            let expired = record.is_expired_for(life_cache, now);
            if !expired || use_expired_data {
                tracing::debug!(key = %key, stale = expired, "Memory hit");
                self.stats.memory_hit(expired);
                return Some(record);
            }
            tracing::debug!(key = %key, "Memory record expired");
        }
        self.stats.memory_miss();

        let record = match self.persistence.get(key.as_str()).await {
            Ok(Some(raw)) => match raw.decode::<V>(key.as_str()) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Ignoring malformed persisted record");
                    self.stats.persistence_miss();
                    return None;
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                self.stats.persistence_miss();
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Persistence read failed");
                self.stats.persistence_miss();
                return None;
            }
        };

        let expired = record.is_expired_for(life_cache, now);
        if expired && !use_expired_data {
            tracing::debug!(key = %key, "Persisted record expired");
            self.stats.persistence_miss();
            return None;
        }

        if !expired {
            tracing::debug!(key = %key, "Promoting persisted record to memory");
            self.memory
                .put(key.as_str(), record.clone().with_source(Source::Memory));
        }
        self.stats.persistence_hit(expired);
        Some(record.with_source(Source::Persistence))
    }

    /// Write through both tiers. Returns whether the durable write happened.
    pub async fn save<V: Cacheable>(
        &self,
        descriptor: &Descriptor,
        data: V,
        max_persistence_mb: f64,
    ) -> Result<bool, ConfigurationError> {
        self.save_record.save(descriptor, data, max_persistence_mb).await
    }

    /// Evict every key of a provider.
    pub async fn evict_provider_key(&self, provider_key: &str) {
        self.evict_matching(|keys| match_provider_key(keys, provider_key))
            .await;
    }

    /// Evict every key under a dynamic key, groups included.
    pub async fn evict_dynamic_key(&self, provider_key: &str, dynamic_key: &str) {
        self.evict_matching(|keys| match_dynamic_key(keys, provider_key, dynamic_key))
            .await;
    }

    /// Evict one dynamic key group.
    pub async fn evict_dynamic_key_group(&self, provider_key: &str, group: &DynamicKeyGroup) {
        self.evict_matching(|keys| {
            match_dynamic_key_group(keys, provider_key, group)
                .into_iter()
                .collect()
        })
        .await;
    }

    /// Clear both tiers.
    pub async fn evict_all(&self) {
        self.memory.delete_all();
        if let Err(e) = self.persistence.delete_all().await {
            tracing::warn!(error = %e, "Failed to clear persistence");
        }
    }

    /// Drop the memory tier, as the process would under memory pressure.
    pub fn destroy_memory(&self) {
        self.memory.delete_all();
    }

    async fn evict_matching(&self, select: impl Fn(&[String]) -> Vec<String>) {
        for key in select(self.memory.keys().as_slice()) {
            self.memory.delete(&key);
        }

        let durable_keys = match self.persistence.all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate persisted keys for eviction");
                return;
            }
        };
        for key in select(durable_keys.as_slice()) {
            if let Err(e) = self.delete_durable(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to evict persisted record");
            }
        }
    }

    async fn delete_durable(&self, key: &str) -> Result<(), PersistenceError> {
        self.persistence.delete(key).await?;
        tracing::debug!(key = %key, "Evicted");
        Ok(())
    }
}
