//! Request results with provenance.

use serde::{Deserialize, Serialize};
use tiercache_core::Source;

/// A value returned by [`crate::Providers::request`], tagged with the tier
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply<V> {
    data: V,
    source: Source,
}

impl<V> Reply<V> {
    pub fn new(data: V, source: Source) -> Self {
        Self { data, source }
    }

    /// A value fresh from the loader.
    pub fn from_loader(data: V) -> Self {
        Self::new(data, Source::Cloud)
    }

    pub fn data(&self) -> &V {
        &self.data
    }

    pub fn into_data(self) -> V {
        self.data
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// True when either cache tier answered instead of the loader.
    pub fn was_cache_hit(&self) -> bool {
        self.source != Source::Cloud
    }
}
