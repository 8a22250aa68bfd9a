//! Volatile tier.

use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use tiercache_core::Record;

use crate::Cacheable;

type Entry = Arc<dyn Any + Send + Sync>;

/// Process-lifetime key to record map.
///
/// Records of any payload type share one map. Each entry holds an
/// `Arc<Record<V>>`; reading it back as a different `V` is a miss. Keys
/// enumerate in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<IndexMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was stored under `key`.
    pub fn put<V: Cacheable>(&self, key: &str, record: Record<V>) {
        let entry: Entry = Arc::new(record);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), entry);
    }

    /// A deep copy of the record under `key`, if it holds a `V`.
    pub fn get<V: Cacheable>(&self, key: &str) -> Option<Record<V>> {
        let entry = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries.get(key).cloned()?
        };
        match entry.downcast::<Record<V>>() {
            Ok(record) => Some(Record::clone(&record)),
            Err(_) => {
                tracing::debug!(key = %key, "Memory entry holds a different payload type");
                None
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(key)
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(key).is_some()
    }

    pub fn delete_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .finish()
    }
}
