//! Tiercache Test Utilities
//!
//! Shared test infrastructure for the tiercache workspace:
//! - A small payload type and list builders
//! - Counting loaders that record how often they ran
//! - Proptest generators for keys, lifetimes and descriptors
//! - Fixtures and assertions for common scenarios

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export core types for convenience
pub use tiercache_core::{
    CacheConfig, CacheError, CacheResult, ConfigurationError, Descriptor, DynamicKey,
    DynamicKeyGroup, EvictDirective, LifeCache, Record, Source, StorageKey, TimeUnit,
};
pub use tiercache_storage::{InMemoryPersistence, Persistence};

// ============================================================================
// PAYLOADS
// ============================================================================

/// Test payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mock {
    pub message: String,
}

impl Mock {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `n` mocks with messages "0" through "n-1".
pub fn mocks(n: usize) -> Vec<Mock> {
    (0..n).map(|i| Mock::new(i.to_string())).collect()
}

/// A mock whose message is `bytes` long, for filling the durable tier.
pub fn sized_mock(bytes: usize) -> Mock {
    Mock::new("x".repeat(bytes))
}

// ============================================================================
// LOADERS
// ============================================================================

/// Failures produced by test loaders.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderFailure {
    #[error("network offline")]
    Offline,

    #[error("server returned status {0}")]
    Status(u16),
}

/// Loader factory that counts how many loads actually ran.
///
/// The counter is bumped when the returned future is first polled, so a
/// loader that is built but never awaited is not counted.
#[derive(Debug, Clone, Default)]
pub struct CountingLoader {
    calls: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A load that yields `value`.
    pub fn load<V>(&self, value: V) -> impl Future<Output = Result<V, LoaderFailure>> + Send
    where
        V: Send,
    {
        self.load_after(value, Duration::ZERO)
    }

    /// A load that yields `value` after `delay`.
    pub fn load_after<V>(
        &self,
        value: V,
        delay: Duration,
    ) -> impl Future<Output = Result<V, LoaderFailure>> + Send
    where
        V: Send,
    {
        let calls = Arc::clone(&self.calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(value)
        }
    }

    /// A load that fails with `failure`.
    pub fn fail<V>(
        &self,
        failure: LoaderFailure,
    ) -> impl Future<Output = Result<V, LoaderFailure>> + Send
    where
        V: Send,
    {
        let calls = Arc::clone(&self.calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(failure)
        }
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tiercache types.

    use super::*;
    use proptest::prelude::*;

    /// Provider keys, including the escaped characters.
    pub fn arb_provider_key() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_$\\\\]{1,12}"
    }

    pub fn arb_dynamic_key() -> impl Strategy<Value = DynamicKey> {
        "[a-zA-Z0-9_$\\\\]{0,8}".prop_map(DynamicKey::new)
    }

    pub fn arb_dynamic_key_group() -> impl Strategy<Value = DynamicKeyGroup> {
        ("[a-zA-Z0-9_$\\\\]{0,8}", "[a-zA-Z0-9_$\\\\]{0,8}")
            .prop_map(|(dynamic_key, group)| DynamicKeyGroup::new(dynamic_key, group))
    }

    pub fn arb_time_unit() -> impl Strategy<Value = TimeUnit> {
        prop_oneof![
            Just(TimeUnit::Seconds),
            Just(TimeUnit::Minutes),
            Just(TimeUnit::Hours),
            Just(TimeUnit::Days),
        ]
    }

    /// Lifetimes long enough that nothing expires during a test.
    pub fn arb_life_cache() -> impl Strategy<Value = LifeCache> {
        (60.0f64..1000.0, arb_time_unit())
            .prop_map(|(duration, unit)| LifeCache::new(duration, unit))
    }

    pub fn arb_mock() -> impl Strategy<Value = Mock> {
        "[ -~]{0,64}".prop_map(Mock::new)
    }

    /// Descriptors that pass validation and carry no eviction directive.
    pub fn arb_descriptor() -> impl Strategy<Value = Descriptor> {
        let scope = prop_oneof![
            Just((None::<DynamicKey>, None::<DynamicKeyGroup>)),
            arb_dynamic_key().prop_map(|dk| (Some(dk), None::<DynamicKeyGroup>)),
            arb_dynamic_key_group().prop_map(|group| (None::<DynamicKey>, Some(group))),
        ];
        (
            arb_provider_key(),
            scope,
            proptest::option::of(arb_life_cache()),
            any::<bool>(),
        )
            .prop_map(|(provider_key, (dynamic_key, group), life_cache, expirable)| {
                Descriptor {
                    provider_key,
                    dynamic_key,
                    dynamic_key_group: group,
                    life_cache,
                    evict: EvictDirective::None,
                    expirable,
                }
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Default configuration without the startup sweep.
    pub fn quiet_config() -> CacheConfig {
        CacheConfig::default().with_evict_expired_on_start(false)
    }

    /// Configuration that serves expired data when the loader fails.
    pub fn stale_tolerant_config() -> CacheConfig {
        quiet_config().with_use_expired_data_if_loader_not_available(true)
    }

    pub fn in_memory_persistence() -> Arc<InMemoryPersistence> {
        Arc::new(InMemoryPersistence::new())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for tiercache results.

    use super::*;

    /// Assert that a CacheResult is a configuration error.
    #[track_caller]
    pub fn assert_configuration_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Configuration(_)) => {}
            other => panic!("Expected Configuration error, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult carries exactly this loader failure.
    #[track_caller]
    pub fn assert_loader_failure<T: std::fmt::Debug>(
        result: &CacheResult<T>,
        expected: &LoaderFailure,
    ) {
        let failure = result
            .as_ref()
            .err()
            .and_then(CacheError::loader_error)
            .and_then(|inner| inner.downcast_ref::<LoaderFailure>());
        match failure {
            Some(failure) => assert_eq!(failure, expected, "Wrong loader failure"),
            None => panic!("Expected loader failure {:?}, got: {:?}", expected, result),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mocks_are_numbered() {
        let list = mocks(3);
        assert_eq!(list, vec![Mock::new("0"), Mock::new("1"), Mock::new("2")]);
    }

    #[test]
    fn test_sized_mock_length() {
        assert_eq!(sized_mock(128).message.len(), 128);
    }

    #[tokio::test]
    async fn test_counting_loader_counts_on_poll() {
        let loader = CountingLoader::new();
        let pending = loader.load(1u8);
        assert_eq!(loader.calls(), 0);

        assert_eq!(pending.await, Ok(1));
        assert_eq!(loader.fail::<u8>(LoaderFailure::Offline).await, Err(LoaderFailure::Offline));
        assert_eq!(loader.calls(), 2);
    }

    #[test]
    fn test_assert_loader_failure() {
        let result: CacheResult<()> = Err(CacheError::loader(LoaderFailure::Status(503)));
        assertions::assert_loader_failure(&result, &LoaderFailure::Status(503));
    }

    #[test]
    fn test_quiet_config_is_valid() {
        assert!(fixtures::quiet_config().validate().is_ok());
        assert!(fixtures::stale_tolerant_config().use_expired_data_if_loader_not_available);
    }

    proptest! {
        #[test]
        fn prop_generated_descriptors_validate(descriptor in generators::arb_descriptor()) {
            prop_assert!(descriptor.validate().is_ok());
            prop_assert!(descriptor.storage_key().is_ok());
        }
    }
}
