//! Tiercache Storage - Tiers, Write Path and Sweeps
//!
//! Two storage tiers sit behind every cached request:
//!
//! - [`MemoryStore`]: volatile, process-lifetime, always written. It may be
//!   dropped at any time ([`TwoLayerCache::destroy_memory`]) without losing
//!   correctness.
//! - [`Persistence`]: the durable source of truth, bounded by a soft size
//!   ceiling. [`InMemoryPersistence`] and the LMDB-backed [`LmdbPersistence`]
//!   implement it.
//!
//! [`TwoLayerCache`] reads memory first, then persistence (promoting hits back
//! into memory), and owns every eviction entry point. Two sweeps keep the
//! durable tier in check: [`EvictExpiredRecords`] drops records whose own
//! lifetime has elapsed, and [`EvictExpirableRecords`] shrinks an oversize store
//! by dropping records flagged as expirable.

use serde::{de::DeserializeOwned, Serialize};

pub mod memory;
pub mod persistence;
pub mod save_record;
pub mod stats;
pub mod sweep;
pub mod two_layer;

pub use memory::MemoryStore;
pub use persistence::{InMemoryPersistence, LmdbPersistence, Persistence};
pub use save_record::SaveRecord;
pub use stats::CacheStats;
pub use sweep::{EvictExpirableRecords, EvictExpiredRecords, SweepOutcome};
pub use two_layer::TwoLayerCache;

/// Marker trait for payloads that can be cached.
///
/// - `Clone` gives every reader its own deep copy of the cached value
/// - `Serialize`/`DeserializeOwned` let the value cross into the durable tier
/// - `Send + Sync + 'static` for sharing across tasks
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}
