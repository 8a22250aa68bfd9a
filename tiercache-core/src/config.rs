//! Process-wide cache configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

pub const DEFAULT_MAX_PERSISTENCE_MB: f64 = 100.0;
pub const DEFAULT_STOP_PERCENTAGE: f64 = 0.85;

/// Settings shared by every request served through one cache instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Durable writes are skipped once the store reaches this size.
    /// Zero or less disables durable writes.
    pub max_persistence_mb: f64,
    /// Serve expired records when the loader fails.
    pub use_expired_data_if_loader_not_available: bool,
    /// Fraction of the ceiling the oversize sweep shrinks the store to.
    pub stop_percentage: f64,
    /// Run the expired-records sweep once when the facade is built.
    pub evict_expired_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_persistence_mb: DEFAULT_MAX_PERSISTENCE_MB,
            use_expired_data_if_loader_not_available: false,
            stop_percentage: DEFAULT_STOP_PERCENTAGE,
            evict_expired_on_start: true,
        }
    }
}

impl CacheConfig {
    pub fn with_max_persistence_mb(mut self, max_persistence_mb: f64) -> Self {
        self.max_persistence_mb = max_persistence_mb;
        self
    }

    pub fn with_use_expired_data_if_loader_not_available(mut self, enabled: bool) -> Self {
        self.use_expired_data_if_loader_not_available = enabled;
        self
    }

    pub fn with_stop_percentage(mut self, stop_percentage: f64) -> Self {
        self.stop_percentage = stop_percentage;
        self
    }

    pub fn with_evict_expired_on_start(mut self, enabled: bool) -> Self {
        self.evict_expired_on_start = enabled;
        self
    }

    /// Load from `TIERCACHE_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let defaults = Self::default();

        let max_persistence_mb = lookup("TIERCACHE_MAX_PERSISTENCE_MB")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_persistence_mb);

        let use_expired_data_if_loader_not_available = lookup("TIERCACHE_USE_EXPIRED_DATA")
            .map(|s| s.trim().to_lowercase() == "true")
            .unwrap_or(defaults.use_expired_data_if_loader_not_available);

        let stop_percentage = lookup("TIERCACHE_SWEEP_STOP_PERCENTAGE")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.stop_percentage);

        let evict_expired_on_start = lookup("TIERCACHE_EVICT_EXPIRED_ON_START")
            .map(|s| s.trim().to_lowercase() != "false")
            .unwrap_or(defaults.evict_expired_on_start);

        let config = Self {
            max_persistence_mb,
            use_expired_data_if_loader_not_available,
            stop_percentage,
            evict_expired_on_start,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.max_persistence_mb.is_finite() || self.max_persistence_mb < 0.0 {
            return Err(ConfigurationError::InvalidValue {
                field: "max_persistence_mb".to_string(),
                value: self.max_persistence_mb.to_string(),
                reason: "must be a finite, non-negative number of megabytes".to_string(),
            });
        }
        if !(self.stop_percentage > 0.0 && self.stop_percentage <= 1.0) {
            return Err(ConfigurationError::InvalidValue {
                field: "stop_percentage".to_string(),
                value: self.stop_percentage.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        Ok(())
    }

    /// Size the oversize sweep stops at.
    pub fn sweep_target_mb(&self) -> f64 {
        self.max_persistence_mb * self.stop_percentage
    }
}
