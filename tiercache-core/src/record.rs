//! Cached record snapshots and their metadata.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::ttl::LifeCache;

/// Bytes in one megabyte for size accounting.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Which tier produced a value.
///
/// `Cloud` marks a value fresh from the loader. It is never persisted as such.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Memory,
    Persistence,
    Cloud,
}

/// Current wall-clock time as fractional epoch seconds.
pub fn now_epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Expiration rule shared by retrieval and the expired-records sweep.
///
/// A non-positive lifetime never expires.
pub fn is_expired_at(persisted_at: f64, life_time_seconds: f64, now: f64) -> bool {
    life_time_seconds > 0.0 && now - persisted_at >= life_time_seconds
}

fn default_expirable() -> bool {
    true
}

/// An immutable snapshot of cached data plus the metadata the tiers need.
///
/// Tiers replace records wholesale; nothing mutates a stored record in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<V> {
    pub source: Source,
    /// Epoch seconds at which the record was written.
    pub persisted_at: f64,
    /// Lifetime declared at write time. Zero means no time-based expiry.
    pub life_time_seconds: f64,
    /// Eligible for the oversize sweep.
    #[serde(default = "default_expirable")]
    pub is_expirable: bool,
    pub data: V,
}

impl<V> Record<V> {
    /// Fresh memory-sourced record stamped with the current time.
    pub fn new(data: V, life_cache: Option<&LifeCache>, is_expirable: bool) -> Self {
        Self {
            source: Source::Memory,
            persisted_at: now_epoch_seconds(),
            life_time_seconds: life_cache.map(LifeCache::as_seconds).unwrap_or(0.0),
            is_expirable,
            data,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn with_persisted_at(mut self, persisted_at: f64) -> Self {
        self.persisted_at = persisted_at;
        self
    }

    /// Expiry against a lifetime supplied by the caller at read time.
    pub fn is_expired_for(&self, life_cache: Option<&LifeCache>, now: f64) -> bool {
        match life_cache {
            Some(life) => is_expired_at(self.persisted_at, life.as_seconds(), now),
            None => false,
        }
    }

    /// Expiry against the lifetime stored in the record itself.
    pub fn has_expired(&self, now: f64) -> bool {
        is_expired_at(self.persisted_at, self.life_time_seconds, now)
    }

    pub fn map_data<U>(self, f: impl FnOnce(V) -> U) -> Record<U> {
        Record {
            source: self.source,
            persisted_at: self.persisted_at,
            life_time_seconds: self.life_time_seconds,
            is_expirable: self.is_expirable,
            data: f(self.data),
        }
    }
}

impl<V: Serialize> Record<V> {
    /// Encoded byte length; the size the durable tier accounts for.
    pub fn size_bytes(&self) -> Result<usize, PersistenceError> {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .map_err(|e| PersistenceError::Serialization {
                reason: e.to_string(),
            })
    }

    pub fn size_mb(&self) -> Result<f64, PersistenceError> {
        Ok(self.size_bytes()? as f64 / BYTES_PER_MB)
    }

    /// Erase the payload type for the durable tier.
    pub fn to_json_record(&self) -> Result<Record<serde_json::Value>, PersistenceError> {
        let data = serde_json::to_value(&self.data).map_err(|e| PersistenceError::Serialization {
            reason: e.to_string(),
        })?;
        Ok(Record {
            source: self.source,
            persisted_at: self.persisted_at,
            life_time_seconds: self.life_time_seconds,
            is_expirable: self.is_expirable,
            data,
        })
    }
}

impl Record<serde_json::Value> {
    /// Recover a typed record from the durable tier.
    pub fn decode<V: DeserializeOwned>(self, key: &str) -> Result<Record<V>, PersistenceError> {
        let Record {
            source,
            persisted_at,
            life_time_seconds,
            is_expirable,
            data,
        } = self;
        let data = serde_json::from_value(data).map_err(|e| PersistenceError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Record {
            source,
            persisted_at,
            life_time_seconds,
            is_expirable,
            data,
        })
    }
}
