//! Size-bounded eviction of expirable records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::persistence::{bytes_to_mb, Persistence};

use super::SweepOutcome;

/// Clears the running flag when a sweep ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shrinks an oversize durable tier by deleting records flagged expirable.
///
/// A sweep starts only when none is running and the store has reached its
/// ceiling. It deletes expirable records in key order until the running size
/// estimate drops to `max_persistence_mb * stop_percentage`. Records saved as
/// non-expirable are never touched, so a store full of them stays over its
/// ceiling.
pub struct EvictExpirableRecords {
    persistence: Arc<dyn Persistence>,
    max_persistence_mb: f64,
    stop_percentage: f64,
    running: Arc<AtomicBool>,
    could_be_expirable_records: AtomicBool,
}

impl EvictExpirableRecords {
    pub fn new(persistence: Arc<dyn Persistence>, max_persistence_mb: f64, stop_percentage: f64) -> Self {
        Self {
            persistence,
            max_persistence_mb,
            stop_percentage,
            running: Arc::new(AtomicBool::new(false)),
            could_be_expirable_records: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the last sweep that ran found anything expirable.
    ///
    /// `true` until a sweep has run.
    pub fn could_be_expirable_records(&self) -> bool {
        self.could_be_expirable_records.load(Ordering::Acquire)
    }

    pub fn target_mb(&self) -> f64 {
        self.max_persistence_mb * self.stop_percentage
    }

    /// Spawn a sweep on the current tokio runtime if one is due.
    ///
    /// Without a current runtime the sweep runs inline before returning.
    /// Returns whether a sweep was started. Never queues: a call made while a
    /// sweep is running does nothing.
    pub async fn start_task_if_needed(self: &Arc<Self>) -> bool {
        let Some((guard, size_mb)) = self.try_begin().await else {
            return false;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = Arc::clone(self);
                handle.spawn(async move {
                    let _guard = guard;
                    this.sweep(size_mb).await;
                });
            }
            Err(_) => {
                tracing::debug!("No tokio runtime, running oversize sweep inline");
                let _guard = guard;
                self.sweep(size_mb).await;
            }
        }
        true
    }

    /// Run a sweep inline if one is due. `None` when nothing ran.
    pub async fn run_if_needed(&self) -> Option<SweepOutcome> {
        let (_guard, size_mb) = self.try_begin().await?;
        Some(self.sweep(size_mb).await)
    }

    async fn try_begin(&self) -> Option<(RunningGuard, f64)> {
        if self.is_running() || self.max_persistence_mb <= 0.0 {
            return None;
        }
        let size_mb = match self.persistence.current_size_mb().await {
            Ok(size_mb) => size_mb,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persistence size");
                return None;
            }
        };
        if size_mb < self.max_persistence_mb {
            return None;
        }
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some((RunningGuard(Arc::clone(&self.running)), size_mb))
    }

    async fn sweep(&self, starting_size_mb: f64) -> SweepOutcome {
        let target_mb = self.target_mb();
        tracing::info!(
            size_mb = starting_size_mb,
            target_mb,
            "Oversize sweep started"
        );

        let keys = match self.persistence.all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate persisted keys");
                return SweepOutcome {
                    evicted: Vec::new(),
                    remaining_mb: starting_size_mb,
                };
            }
        };

        let mut remaining_mb = starting_size_mb;
        let mut evicted = Vec::new();
        let mut found_expirable = false;

        for key in keys {
            if remaining_mb <= target_mb {
                break;
            }
            match self.persistence.get(&key).await {
                Ok(Some(record)) if record.is_expirable => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable record");
                    continue;
                }
            }
            found_expirable = true;

            let size_bytes = match self.persistence.size_bytes(&key).await {
                Ok(size) => size.unwrap_or(0),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Could not size record");
                    continue;
                }
            };
            if let Err(e) = self.persistence.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to delete expirable record");
                continue;
            }
            remaining_mb -= bytes_to_mb(size_bytes);
            evicted.push(key);
        }

        self.could_be_expirable_records
            .store(found_expirable, Ordering::Release);
        tracing::info!(
            evicted = evicted.len(),
            remaining_mb,
            could_be_expirable_records = found_expirable,
            "Oversize sweep finished"
        );
        SweepOutcome {
            evicted,
            remaining_mb,
        }
    }
}
