//! Retrieval counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of [`crate::TwoLayerCache`] retrieval statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of `retrieve` calls.
    pub retrievals: u64,
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub persistence_hits: u64,
    pub persistence_misses: u64,
    /// Hits served with expired data.
    pub stale_hits: u64,
}

impl CacheStats {
    /// Fraction of retrievals answered by either tier (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        if self.retrievals == 0 {
            0.0
        } else {
            (self.memory_hits + self.persistence_hits) as f64 / self.retrievals as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    retrievals: AtomicU64,
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    persistence_hits: AtomicU64,
    persistence_misses: AtomicU64,
    stale_hits: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn retrieval(&self) {
        self.retrievals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn memory_hit(&self, stale: bool) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
        if stale {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn persistence_hit(&self, stale: bool) {
        self.persistence_hits.fetch_add(1, Ordering::Relaxed);
        if stale {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn persistence_miss(&self) {
        self.persistence_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            retrievals: self.retrievals.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.memory_misses.load(Ordering::Relaxed),
            persistence_hits: self.persistence_hits.load(Ordering::Relaxed),
            persistence_misses: self.persistence_misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot().hit_rate(), 0.0);

        for _ in 0..4 {
            counters.retrieval();
        }
        counters.memory_hit(false);
        counters.memory_miss();
        counters.persistence_hit(true);
        counters.memory_miss();
        counters.persistence_miss();
        counters.memory_miss();
        counters.persistence_miss();

        let stats = counters.snapshot();
        assert_eq!(stats.retrievals, 4);
        assert_eq!(stats.stale_hits, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
