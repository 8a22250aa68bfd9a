//! LMDB-backed durable tier.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each record is stored as its
//! JSON encoding under the UTF-8 storage key, in a single unnamed database.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get` and `all_keys`
//! - Write transactions for `put`, `delete` and `delete_all`
//!
//! A committed write is visible in full or not at all, so readers never
//! observe a partially written record.
//!
//! The store's size is a running byte total, seeded by one walk at open and
//! adjusted by every write. Writers hold the total's lock for the whole write
//! transaction so the total always matches the committed data.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use serde_json::Value;
use tiercache_core::{PersistenceError, Record};

use super::{bytes_to_mb, decode, encode, Persistence};

fn transaction(e: heed::Error) -> PersistenceError {
    PersistenceError::Transaction {
        reason: e.to_string(),
    }
}

/// LMDB [`Persistence`]; keys enumerate in byte order.
///
/// # Example
///
/// ```ignore
/// use tiercache_storage::LmdbPersistence;
///
/// let persistence = LmdbPersistence::open("/var/cache/app", 256)?;
/// let cache = TwoLayerCache::new(Arc::new(persistence));
/// ```
pub struct LmdbPersistence {
    env: Env,
    db: Database<Bytes, Bytes>,
    total_bytes: Mutex<u64>,
}

impl LmdbPersistence {
    /// Open (or create) the store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `map_size_mb` - Upper bound of the memory map. Keep it above the
    ///   configured persistence ceiling; writes past it fail and are skipped.
    pub fn open<P: AsRef<Path>>(path: P, map_size_mb: usize) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| PersistenceError::Open {
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(transaction)?;
        let db: Database<Bytes, Bytes> =
            env.create_database(&mut wtxn, None)
                .map_err(|e| PersistenceError::Open {
                    reason: e.to_string(),
                })?;
        wtxn.commit().map_err(transaction)?;

        let total_bytes = stored_bytes(&env, db)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            map_size_mb,
            total_bytes,
            "Opened LMDB persistence"
        );
        Ok(Self {
            env,
            db,
            total_bytes: Mutex::new(total_bytes),
        })
    }
}

/// Sum of every stored value's length.
fn stored_bytes(env: &Env, db: Database<Bytes, Bytes>) -> Result<u64, PersistenceError> {
    let rtxn = env.read_txn().map_err(transaction)?;
    let mut total = 0u64;
    for entry in db.iter(&rtxn).map_err(transaction)? {
        let (_, value) = entry.map_err(transaction)?;
        total += value.len() as u64;
    }
    Ok(total)
}

#[async_trait]
impl Persistence for LmdbPersistence {
    async fn put(&self, key: &str, record: &Record<Value>) -> Result<(), PersistenceError> {
        let bytes = encode(record)?;
        let mut total = self.total_bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut wtxn = self.env.write_txn().map_err(transaction)?;
        let replaced = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(transaction)?
            .map_or(0, |old| old.len() as u64);
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(transaction)?;
        wtxn.commit().map_err(transaction)?;
        *total = total.saturating_sub(replaced) + bytes.len() as u64;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Record<Value>>, PersistenceError> {
        let rtxn = self.env.read_txn().map_err(transaction)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(transaction)? {
            Some(bytes) => decode(key, bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let mut total = self.total_bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut wtxn = self.env.write_txn().map_err(transaction)?;
        let removed = self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(transaction)?
            .map_or(0, |old| old.len() as u64);
        self.db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(transaction)?;
        wtxn.commit().map_err(transaction)?;
        *total = total.saturating_sub(removed);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), PersistenceError> {
        let mut total = self.total_bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut wtxn = self.env.write_txn().map_err(transaction)?;
        self.db.clear(&mut wtxn).map_err(transaction)?;
        wtxn.commit().map_err(transaction)?;
        *total = 0;
        Ok(())
    }

    async fn all_keys(&self) -> Result<Vec<String>, PersistenceError> {
        let rtxn = self.env.read_txn().map_err(transaction)?;
        let mut keys = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(transaction)? {
            let (key, _) = entry.map_err(transaction)?;
            match std::str::from_utf8(key) {
                Ok(key) => keys.push(key.to_string()),
                Err(e) => tracing::warn!(error = %e, "Skipping non UTF-8 key in LMDB persistence"),
            }
        }
        Ok(keys)
    }

    async fn current_size_mb(&self) -> Result<f64, PersistenceError> {
        let total = *self.total_bytes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(bytes_to_mb(total))
    }

    async fn size_bytes(&self, key: &str) -> Result<Option<u64>, PersistenceError> {
        let rtxn = self.env.read_txn().map_err(transaction)?;
        let size = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(transaction)?
            .map(|bytes| bytes.len() as u64);
        Ok(size)
    }
}
