//! The request orchestration facade.

use std::error::Error as StdError;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tiercache_core::{CacheConfig, CacheError, CacheResult, Descriptor, EvictDirective, StorageKey};
use tiercache_storage::{
    Cacheable, EvictExpirableRecords, EvictExpiredRecords, LmdbPersistence, Persistence,
    TwoLayerCache,
};

use crate::in_flight::InFlight;
use crate::reply::Reply;

/// Binds loaders to the two-tier cache.
///
/// Build one per process (or per cache directory) and share it by reference
/// or `Arc`. Inside a tokio runtime the oversize sweep is spawned after a
/// save; elsewhere it runs inline within the request.
///
/// # Example
///
/// ```ignore
/// let providers = Providers::new(Arc::new(InMemoryPersistence::new()), CacheConfig::default())?;
/// let descriptor = Descriptor::new("users")
///     .with_dynamic_key("page-1")
///     .with_life_cache(LifeCache::minutes(5.0));
///
/// let reply = providers.request(&descriptor, || api.users(1)).await?;
/// println!("{} users from {:?}", reply.data().len(), reply.source());
/// ```
pub struct Providers {
    cache: Arc<TwoLayerCache>,
    expirable_sweep: Arc<EvictExpirableRecords>,
    expired_sweep: Arc<EvictExpiredRecords>,
    config: CacheConfig,
    in_flight: InFlight,
}

impl Providers {
    /// Build the facade over a durable tier.
    ///
    /// When `config.evict_expired_on_start` is set and a tokio runtime is
    /// current, the expired-records sweep is spawned once.
    pub fn new(persistence: Arc<dyn Persistence>, config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;

        let cache = Arc::new(TwoLayerCache::new(Arc::clone(&persistence)));
        let expirable_sweep = Arc::new(EvictExpirableRecords::new(
            Arc::clone(&persistence),
            config.max_persistence_mb,
            config.stop_percentage,
        ));
        let expired_sweep = Arc::new(EvictExpiredRecords::new(
            Arc::clone(cache.memory()),
            persistence,
        ));

        let providers = Self {
            cache,
            expirable_sweep,
            expired_sweep,
            config,
            in_flight: InFlight::default(),
        };
        if providers.config.evict_expired_on_start {
            providers.spawn_expired_sweep();
        }
        Ok(providers)
    }

    /// Build the facade over an LMDB store in `path`.
    ///
    /// The memory map is sized to twice the persistence ceiling so the
    /// oversize sweep, not LMDB, is what bounds the store.
    pub fn open_lmdb<P: AsRef<Path>>(path: P, config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let map_size_mb = (config.max_persistence_mb.ceil() as usize).max(1) * 2;
        let persistence = LmdbPersistence::open(path, map_size_mb)?;
        Self::new(Arc::new(persistence), config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TwoLayerCache> {
        &self.cache
    }

    pub fn expirable_sweep(&self) -> &Arc<EvictExpirableRecords> {
        &self.expirable_sweep
    }

    /// Run the expired-records sweep now and return the evicted keys.
    pub async fn evict_expired_records(&self) -> Vec<String> {
        self.expired_sweep.run().await
    }

    /// Clear both tiers.
    pub async fn evict_all(&self) {
        self.cache.evict_all().await;
    }

    /// Serve `descriptor` from the cache, or from `loader` on a miss.
    ///
    /// 1. The descriptor is validated and its key composed.
    /// 2. Any eviction directive runs before the lookup.
    /// 3. A hit returns without calling `loader`.
    /// 4. On a miss `loader` runs once, its value is saved and returned as
    ///    [`Source::Cloud`](tiercache_core::Source::Cloud).
    /// 5. If the loader fails and expired data is allowed, an expired record
    ///    is served instead; otherwise the loader's error is returned.
    ///
    /// Concurrent requests for the same key share a single loader run; every
    /// caller gets its own copy of the result.
    pub async fn request<V, F, Fut, E>(
        &self,
        descriptor: &Descriptor,
        loader: F,
    ) -> CacheResult<Reply<V>>
    where
        V: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let key = descriptor.storage_key()?;
        self.evict(descriptor).await;

        self.in_flight
            .run(key.as_str(), || self.resolve(&key, descriptor, loader))
            .await
    }

    /// [`Providers::request`] without the provenance.
    pub async fn request_value<V, F, Fut, E>(
        &self,
        descriptor: &Descriptor,
        loader: F,
    ) -> CacheResult<V>
    where
        V: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        self.request(descriptor, loader).await.map(Reply::into_data)
    }

    /// Store `data` under the descriptor's key without consulting a loader.
    ///
    /// Runs the eviction directive, then writes through both tiers. Bypasses
    /// request coalescing so a concurrent load cannot swallow the write.
    pub(crate) async fn replace<V: Cacheable>(
        &self,
        descriptor: &Descriptor,
        data: V,
    ) -> CacheResult<()> {
        let key = descriptor.storage_key()?;
        self.evict(descriptor).await;
        let persisted = self
            .cache
            .save(descriptor, data, self.config.max_persistence_mb)
            .await?;
        tracing::debug!(key = %key, persisted, "Replaced cached value");
        self.expirable_sweep.start_task_if_needed().await;
        Ok(())
    }

    async fn evict(&self, descriptor: &Descriptor) {
        let provider_key = descriptor.provider_key.as_str();
        match descriptor.evict {
            EvictDirective::None => {}
            EvictDirective::Provider => self.cache.evict_provider_key(provider_key).await,
            EvictDirective::DynamicKey => {
                if let Some(dynamic_key) = descriptor.scoping_dynamic_key() {
                    self.cache.evict_dynamic_key(provider_key, dynamic_key).await;
                }
            }
            EvictDirective::DynamicKeyGroup => {
                if let Some(group) = &descriptor.dynamic_key_group {
                    self.cache.evict_dynamic_key_group(provider_key, group).await;
                }
            }
        }
    }

    async fn resolve<V, F, Fut, E>(
        &self,
        key: &StorageKey,
        descriptor: &Descriptor,
        loader: F,
    ) -> CacheResult<Reply<V>>
    where
        V: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let life_cache = descriptor.life_cache.as_ref();
        if let Some(record) = self.cache.retrieve::<V>(key, life_cache, false).await {
            return Ok(Reply::new(record.data, record.source));
        }

        match loader().await {
            Ok(data) => {
                self.cache
                    .save(descriptor, data.clone(), self.config.max_persistence_mb)
                    .await?;
                self.expirable_sweep.start_task_if_needed().await;
                Ok(Reply::from_loader(data))
            }
            Err(e) => {
                let error = CacheError::loader(e);
                if !self.config.use_expired_data_if_loader_not_available {
                    return Err(error);
                }
                match self.cache.retrieve::<V>(key, life_cache, true).await {
                    Some(record) => {
                        tracing::warn!(key = %key, error = %error, "Loader failed, serving expired data");
                        Ok(Reply::new(record.data, record.source))
                    }
                    None => Err(error),
                }
            }
        }
    }

    fn spawn_expired_sweep(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let sweep = Arc::clone(&self.expired_sweep);
                handle.spawn(async move {
                    sweep.run().await;
                });
            }
            Err(_) => {
                tracing::debug!("No tokio runtime, skipping startup expired records sweep");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tiercache_core::{ConfigurationError, DynamicKeyGroup, LifeCache, Source};
    use tiercache_storage::InMemoryPersistence;

    fn providers(config: CacheConfig) -> Providers {
        Providers::new(Arc::new(InMemoryPersistence::new()), config).unwrap()
    }

    fn quiet() -> CacheConfig {
        CacheConfig::default().with_evict_expired_on_start(false)
    }

    async fn load(value: &str) -> Result<String, std::io::Error> {
        Ok(value.to_string())
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let providers = providers(quiet());
        let descriptor = Descriptor::new("mocks");

        let first = providers.request(&descriptor, || load("v1")).await.unwrap();
        assert_eq!(first.source(), Source::Cloud);

        let second = providers.request(&descriptor, || load("v2")).await.unwrap();
        assert_eq!(second.source(), Source::Memory);
        assert_eq!(second.data(), "v1");
    }

    #[tokio::test]
    async fn test_loader_not_called_on_hit() {
        let providers = providers(quiet());
        let descriptor = Descriptor::new("mocks");
        providers.request_value(&descriptor, || load("v")).await.unwrap();

        let calls = AtomicUsize::new(0);
        let value = providers
            .request_value(&descriptor, || {
                calls.fetch_add(1, Ordering::SeqCst);
                load("other")
            })
            .await
            .unwrap();
        assert_eq!(value, "v");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_configuration_error_before_any_io() {
        let providers = providers(quiet());
        let descriptor = Descriptor::new("mocks")
            .with_dynamic_key("1")
            .with_dynamic_key_group(DynamicKeyGroup::new("1", "a"));

        let err = providers
            .request(&descriptor, || load("v"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Configuration(ConfigurationError::DynamicKeyAndGroupBothSet { .. })
        ));
        assert_eq!(providers.cache().stats().retrievals, 0);
    }

    #[tokio::test]
    async fn test_evict_provider_directive_forces_reload() {
        let providers = providers(quiet());
        let descriptor = Descriptor::new("mocks");
        providers.request_value(&descriptor, || load("old")).await.unwrap();

        let evicting = descriptor.clone().with_evict(EvictDirective::Provider);
        let reply = providers.request(&evicting, || load("new")).await.unwrap();
        assert_eq!(reply.source(), Source::Cloud);
        assert_eq!(reply.data(), "new");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = Providers::new(
            Arc::new(InMemoryPersistence::new()),
            quiet().with_stop_percentage(0.0),
        );
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_startup_sweep_removes_expired_records() {
        let persistence = Arc::new(InMemoryPersistence::new());
        {
            let seeding = Providers::new(persistence.clone(), quiet()).unwrap();
            let descriptor = Descriptor::new("mocks").with_life_cache(LifeCache::seconds(0.05));
            seeding.request_value(&descriptor, || load("v")).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let _providers = Providers::new(persistence.clone(), CacheConfig::default()).unwrap();
        for _ in 0..50 {
            if persistence.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(persistence.is_empty());
    }

    #[test]
    fn test_construction_outside_runtime_skips_startup_sweep() {
        let providers = Providers::new(Arc::new(InMemoryPersistence::new()), CacheConfig::default());
        assert!(providers.is_ok());
    }
}
