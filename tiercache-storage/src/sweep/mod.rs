//! Background eviction sweeps over the durable tier.

mod expired;
mod oversize;

pub use expired::EvictExpiredRecords;
pub use oversize::EvictExpirableRecords;

/// Result of one oversize sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    /// Evicted keys, in deletion order.
    pub evicted: Vec<String>,
    /// Size estimate after the last deletion, in megabytes.
    pub remaining_mb: f64,
}
