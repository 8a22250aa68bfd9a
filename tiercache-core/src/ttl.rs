//! Time-to-live declarations.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unit a [`LifeCache`] duration is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Days => 86_400.0,
        }
    }
}

/// How long a cached record stays fresh.
///
/// A zero (or negative) duration means the record never expires by time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifeCache {
    duration: f64,
    unit: TimeUnit,
}

impl LifeCache {
    pub fn new(duration: f64, unit: TimeUnit) -> Self {
        Self { duration, unit }
    }

    pub fn seconds(duration: f64) -> Self {
        Self::new(duration, TimeUnit::Seconds)
    }

    pub fn minutes(duration: f64) -> Self {
        Self::new(duration, TimeUnit::Minutes)
    }

    pub fn hours(duration: f64) -> Self {
        Self::new(duration, TimeUnit::Hours)
    }

    pub fn days(duration: f64) -> Self {
        Self::new(duration, TimeUnit::Days)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Duration normalized to seconds.
    pub fn as_seconds(&self) -> f64 {
        self.duration * self.unit.seconds_per_unit()
    }

    /// True when this declaration never expires anything.
    pub fn is_eternal(&self) -> bool {
        let seconds = self.as_seconds();
        seconds.is_nan() || seconds <= 0.0
    }
}

impl From<Duration> for LifeCache {
    fn from(duration: Duration) -> Self {
        LifeCache::seconds(duration.as_secs_f64())
    }
}
