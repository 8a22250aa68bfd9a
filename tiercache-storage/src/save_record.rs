//! Write path.

use std::sync::Arc;

use tiercache_core::{ConfigurationError, Descriptor, Record, Source, StorageKey};

use crate::memory::MemoryStore;
use crate::persistence::Persistence;
use crate::Cacheable;

/// Writes records through both tiers.
///
/// The memory tier is always written. The durable tier is written only while
/// its size is below the ceiling at call time. The check is advisory: two
/// concurrent writers can both pass it, and the oversize sweep restores the
/// ceiling afterwards.
#[derive(Clone)]
pub struct SaveRecord {
    memory: Arc<MemoryStore>,
    persistence: Arc<dyn Persistence>,
}

impl SaveRecord {
    pub fn new(memory: Arc<MemoryStore>, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            memory,
            persistence,
        }
    }

    /// Save `data` under the descriptor's key with its lifetime and expirability.
    ///
    /// Returns whether the record reached the durable tier.
    pub async fn save<V: Cacheable>(
        &self,
        descriptor: &Descriptor,
        data: V,
        max_persistence_mb: f64,
    ) -> Result<bool, ConfigurationError> {
        let key = descriptor.storage_key()?;
        let record = Record::new(data, descriptor.life_cache.as_ref(), descriptor.expirable);
        Ok(self.save_record(&key, record, max_persistence_mb).await)
    }

    /// Save a prepared record under an already composed key.
    pub async fn save_record<V: Cacheable>(
        &self,
        key: &StorageKey,
        record: Record<V>,
        max_persistence_mb: f64,
    ) -> bool {
        let record = record.with_source(Source::Memory);
        let durable = if max_persistence_mb > 0.0 {
            self.has_room(key, max_persistence_mb).await
        } else {
            false
        };

        let encoded = if durable {
            match record.to_json_record() {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to encode record for persistence");
                    None
                }
            }
        } else {
            None
        };

        self.memory.put(key.as_str(), record);

        let Some(encoded) = encoded else {
            return false;
        };
        match self.persistence.put(key.as_str(), &encoded).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Persistence write failed");
                false
            }
        }
    }

    async fn has_room(&self, key: &StorageKey, max_persistence_mb: f64) -> bool {
        match self.persistence.current_size_mb().await {
            Ok(size_mb) if size_mb < max_persistence_mb => true,
            Ok(size_mb) => {
                tracing::debug!(
                    key = %key,
                    size_mb,
                    max_persistence_mb,
                    "Persistence full, record kept in memory only"
                );
                false
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Could not read persistence size");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use tiercache_core::{DynamicKeyGroup, LifeCache};

    fn setup() -> (SaveRecord, Arc<MemoryStore>, Arc<InMemoryPersistence>) {
        let memory = Arc::new(MemoryStore::new());
        let persistence = Arc::new(InMemoryPersistence::new());
        let save = SaveRecord::new(memory.clone(), persistence.clone());
        (save, memory, persistence)
    }

    #[tokio::test]
    async fn test_save_writes_both_tiers() {
        let (save, memory, persistence) = setup();
        let descriptor = Descriptor::new("mocks")
            .with_dynamic_key("1")
            .with_life_cache(LifeCache::minutes(1.0));

        assert!(save.save(&descriptor, vec![1u32, 2], 10.0).await.unwrap());

        let cached = memory.get::<Vec<u32>>("mocks$1").unwrap();
        assert_eq!(cached.data, vec![1, 2]);
        assert_eq!(cached.source, Source::Memory);
        assert_eq!(cached.life_time_seconds, 60.0);

        let durable = persistence.get("mocks$1").await.unwrap().unwrap();
        assert_eq!(durable.decode::<Vec<u32>>("mocks$1").unwrap().data, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_zero_ceiling_never_persists() {
        let (save, memory, persistence) = setup();
        let descriptor = Descriptor::new("mocks");

        assert!(!save.save(&descriptor, "v".to_string(), 0.0).await.unwrap());
        assert!(memory.contains_key("mocks"));
        assert!(persistence.is_empty());
    }

    #[tokio::test]
    async fn test_full_store_skips_durable_write() {
        let (save, memory, persistence) = setup();
        let big = "x".repeat(600 * 1024);

        assert!(save.save(&Descriptor::new("a"), big.clone(), 0.5).await.unwrap());
        assert!(!save.save(&Descriptor::new("b"), big, 0.5).await.unwrap());

        assert_eq!(persistence.len(), 1);
        assert!(memory.contains_key("a"));
        assert!(memory.contains_key("b"));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_writes_nothing() {
        let (save, memory, persistence) = setup();
        let descriptor = Descriptor::new("mocks")
            .with_dynamic_key("1")
            .with_dynamic_key_group(DynamicKeyGroup::new("1", "a"));

        let err = save.save(&descriptor, 1u8, 10.0).await.unwrap_err();
        assert!(matches!(err, ConfigurationError::DynamicKeyAndGroupBothSet { .. }));
        assert!(memory.is_empty());
        assert!(persistence.is_empty());
    }

    #[tokio::test]
    async fn test_non_expirable_flag_persisted() {
        let (save, _memory, persistence) = setup();
        let descriptor = Descriptor::new("mocks").with_expirable(false);
        save.save(&descriptor, 1u8, 10.0).await.unwrap();
        assert!(!persistence.get("mocks").await.unwrap().unwrap().is_expirable);
    }
}
