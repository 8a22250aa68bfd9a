//! Tiercache Providers - Request Facade
//!
//! [`Providers`] binds a loader (typically a network call) to a cache entry
//! described by a [`Descriptor`]. A request is served from memory, then from
//! the durable tier, and only then from the loader, whose value is written
//! back through both tiers. Concurrent requests for one key share a single
//! loader run.
//!
//! [`Actions`] edits a cached list in place: queue edits, then
//! [`Actions::to_vec`] reads, applies and stores them.
//!
//! Nothing happens until a returned future is polled.

pub mod actions;
mod in_flight;
pub mod providers;
pub mod reply;

pub use actions::Actions;
pub use providers::Providers;
pub use reply::Reply;

pub use tiercache_core::{
    CacheConfig, CacheError, CacheResult, ConfigurationError, Descriptor, DynamicKey,
    DynamicKeyGroup, EvictDirective, LifeCache, Source, TimeUnit,
};
pub use tiercache_storage::{Cacheable, InMemoryPersistence, LmdbPersistence, Persistence};
