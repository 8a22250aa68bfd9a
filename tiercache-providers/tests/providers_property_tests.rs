//! Property-Based Tests for Provider Requests
//!
//! For any valid descriptor and payload:
//! - the first request loads and returns the loader's value
//! - a repeated request is a memory hit with an equal value
//! - after the memory tier is dropped, the durable tier answers with an equal value

use proptest::prelude::*;
use tokio::runtime::Runtime;

use tiercache_providers::Providers;
use tiercache_test_utils::fixtures::{in_memory_persistence, quiet_config};
use tiercache_test_utils::generators::{arb_descriptor, arb_mock};
use tiercache_test_utils::*;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_request_round_trips_through_both_tiers(
        descriptor in arb_descriptor(),
        payload in prop::collection::vec(arb_mock(), 0..8),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let providers = Providers::new(in_memory_persistence(), quiet_config())
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let loader = CountingLoader::new();

            let loaded = providers
                .request(&descriptor, || loader.load(payload.clone()))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(loaded.source(), Source::Cloud);
            prop_assert_eq!(loaded.data(), &payload);

            let cached = providers
                .request(&descriptor, || loader.load(Vec::<Mock>::new()))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(cached.source(), Source::Memory);
            prop_assert_eq!(cached.data(), &payload);

            providers.cache().destroy_memory();
            let durable = providers
                .request(&descriptor, || loader.load(Vec::<Mock>::new()))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(durable.source(), Source::Persistence);
            prop_assert_eq!(durable.data(), &payload);

            prop_assert_eq!(loader.calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_distinct_scopes_do_not_collide(
        provider in generators::arb_provider_key(),
        first in generators::arb_dynamic_key(),
        second in generators::arb_dynamic_key(),
    ) {
        prop_assume!(first != second);
        let rt = test_runtime()?;
        rt.block_on(async {
            let providers = Providers::new(in_memory_persistence(), quiet_config())
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let loader = CountingLoader::new();
            let a = Descriptor::new(provider.clone()).with_dynamic_key(first.clone());
            let b = Descriptor::new(provider.clone()).with_dynamic_key(second.clone());

            providers
                .request(&a, || loader.load(Mock::new("a")))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let reply = providers
                .request(&b, || loader.load(Mock::new("b")))
                .await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            prop_assert_eq!(reply.source(), Source::Cloud);
            prop_assert_eq!(reply.data(), &Mock::new("b"));
            Ok::<(), TestCaseError>(())
        })?;
    }
}
