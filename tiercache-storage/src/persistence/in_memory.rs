//! Process-local durable tier.
//!
//! Keeps encoded records in a map so size accounting and malformed-record
//! handling behave exactly as they do on disk. Useful for tests and for
//! embedding the cache where a real disk is not wanted.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tiercache_core::{PersistenceError, Record};

use super::{bytes_to_mb, decode, encode, Persistence};

#[derive(Debug, Default)]
struct Inner {
    records: IndexMap<String, Vec<u8>>,
    total_bytes: u64,
}

impl Inner {
    fn insert(&mut self, key: &str, bytes: Vec<u8>) {
        let added = bytes.len() as u64;
        if let Some(previous) = self.records.insert(key.to_string(), bytes) {
            self.total_bytes -= previous.len() as u64;
        }
        self.total_bytes += added;
    }

    fn remove(&mut self, key: &str) {
        if let Some(previous) = self.records.shift_remove(key) {
            self.total_bytes -= previous.len() as u64;
        }
    }
}

/// Map-backed [`Persistence`]; keys enumerate in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    inner: RwLock<Inner>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes under a key, bypassing encoding.
    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(key, bytes);
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn put(&self, key: &str, record: &Record<Value>) -> Result<(), PersistenceError> {
        let bytes = encode(record)?;
        self.insert_raw(key, bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Record<Value>>, PersistenceError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .records
            .get(key)
            .map(|bytes| decode(key, bytes))
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.records.clear();
        inner.total_bytes = 0;
        Ok(())
    }

    async fn all_keys(&self) -> Result<Vec<String>, PersistenceError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.records.keys().cloned().collect())
    }

    async fn current_size_mb(&self) -> Result<f64, PersistenceError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(bytes_to_mb(inner.total_bytes))
    }

    async fn size_bytes(&self, key: &str) -> Result<Option<u64>, PersistenceError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.records.get(key).map(|bytes| bytes.len() as u64))
    }
}
