//! Tiercache Core - Data Types
//!
//! Pure data structures shared by the storage tiers and the provider facade:
//! records, lifetimes, storage keys, request descriptors, configuration and
//! errors. This crate performs no I/O.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod key;
pub mod record;
pub mod ttl;

pub use config::{CacheConfig, DEFAULT_MAX_PERSISTENCE_MB, DEFAULT_STOP_PERCENTAGE};
pub use descriptor::{Descriptor, EvictDirective};
pub use error::{CacheError, CacheResult, ConfigurationError, PersistenceError};
pub use key::{
    compose, match_dynamic_key, match_dynamic_key_group, match_provider_key, DynamicKey,
    DynamicKeyGroup, StorageKey,
};
pub use record::{is_expired_at, now_epoch_seconds, Record, Source, BYTES_PER_MB};
pub use ttl::{LifeCache, TimeUnit};
