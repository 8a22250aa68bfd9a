//! Durable tier contract and its backends.
//!
//! The durable tier stores type-erased records (`Record<serde_json::Value>`);
//! callers decode the payload with [`Record::decode`]. Backends account for
//! size in encoded bytes so the soft ceiling and the oversize sweep agree on
//! what "full" means.

use async_trait::async_trait;
use serde_json::Value;
use tiercache_core::{PersistenceError, Record, BYTES_PER_MB};

mod in_memory;
mod lmdb;

pub use in_memory::InMemoryPersistence;
pub use lmdb::LmdbPersistence;

/// Durable key to record store.
///
/// Implementations must be safe for concurrent use and must make each `put`
/// atomic: readers see either the previous record or the new one.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Store a record, replacing any previous one under `key`.
    async fn put(&self, key: &str, record: &Record<Value>) -> Result<(), PersistenceError>;

    /// Load a record.
    ///
    /// Bytes that no longer decode as a record yield [`PersistenceError::Malformed`].
    async fn get(&self, key: &str) -> Result<Option<Record<Value>>, PersistenceError>;

    /// Delete a record. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), PersistenceError>;

    async fn delete_all(&self) -> Result<(), PersistenceError>;

    /// Every stored key, in a stable order.
    async fn all_keys(&self) -> Result<Vec<String>, PersistenceError>;

    /// Total encoded size of all stored records, in megabytes.
    async fn current_size_mb(&self) -> Result<f64, PersistenceError>;

    /// Encoded size of one stored record.
    async fn size_bytes(&self, key: &str) -> Result<Option<u64>, PersistenceError> {
        match self.get(key).await? {
            Some(record) => Ok(Some(record.size_bytes()? as u64)),
            None => Ok(None),
        }
    }
}

pub(crate) fn encode(record: &Record<Value>) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(record).map_err(|e| PersistenceError::Serialization {
        reason: e.to_string(),
    })
}

pub(crate) fn decode(key: &str, bytes: &[u8]) -> Result<Record<Value>, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|e| PersistenceError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}
