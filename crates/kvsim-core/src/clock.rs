//! Logical access clock for cache recency.
//!
//! The [`AccessClock`] hands out monotonically increasing ticks instead of
//! wall-clock timestamps. Every cache operation takes one tick, so two
//! replays of the same workload evict the same blocks.

use serde::{Deserialize, Serialize};

/// Monotonic logical clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClock {
    current: u64,
}

impl AccessClock {
    /// Create a new clock starting at tick zero.
    pub fn new() -> Self {
        Self { current: 0 }
    }

    /// Advance by one and return the new tick.
    pub fn tick(&mut self) -> u64 {
        self.current += 1;
        self.current
    }
}
