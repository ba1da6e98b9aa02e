/*!
 * Poll Schedule
 * Adaptive interval: back off while idle, snap back on activity
 */

use crate::core::config::StreamConfig;
use std::time::Duration;

/// Per-stream poll interval state
#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    current: Duration,
    min: Duration,
    max: Duration,
    factor: f64,
}

impl PollSchedule {
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        let max = max.max(min);
        Self {
            current: min,
            min,
            max,
            factor: factor.max(1.0),
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.min_interval, config.max_interval, config.backoff_factor)
    }

    #[inline]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Nothing new: grow the interval up to the ceiling
    pub fn on_idle(&mut self) -> Duration {
        self.current = self.current.mul_f64(self.factor).min(self.max);
        self.current
    }

    /// New events emitted: poll again at the floor
    pub fn on_activity(&mut self) -> Duration {
        self.current = self.min;
        self.current
    }

    /// Fetch failed: wait the full ceiling before retrying
    pub fn on_error(&mut self) -> Duration {
        self.current = self.max;
        self.current
    }
}
