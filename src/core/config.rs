/*!
 * Stream Configuration
 *
 * Runtime configuration for poll loops: schedule bounds, overlap window,
 * channel capacity and filter budgets
 */

use super::errors::{CaptureError, CaptureResult};
use super::limits::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_POLL_INTERVAL,
    DEFAULT_MIN_POLL_INTERVAL, DEFAULT_OVERLAP_WINDOW, DEFAULT_REGEX_BUDGET,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Poll loop configuration shared by every stream a registry starts
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Interval used right after new events were seen
    pub min_interval: Duration,
    /// Ceiling for idle backoff, also used after errors
    pub max_interval: Duration,
    /// Growth factor per idle cycle
    pub backoff_factor: f64,
    /// Re-read margin behind the watermark
    pub overlap: Duration,
    /// Events retained per stream before the oldest are evicted
    pub channel_capacity: usize,
    /// Per-evaluation budget for exclusion patterns
    pub regex_budget: Duration,
    /// Deliver events already buffered when the stream starts
    pub replay_buffered: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_POLL_INTERVAL,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            overlap: DEFAULT_OVERLAP_WINDOW,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            regex_budget: DEFAULT_REGEX_BUDGET,
            replay_buffered: false,
        }
    }
}

impl StreamConfig {
    /// Configuration for tight feedback loops (tests, local dumps)
    pub const fn responsive() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            overlap: Duration::from_secs(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            regex_budget: DEFAULT_REGEX_BUDGET,
            replay_buffered: true,
        }
    }

    pub fn with_intervals(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_overlap(mut self, overlap: Duration) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_regex_budget(mut self, budget: Duration) -> Self {
        self.regex_budget = budget;
        self
    }

    pub fn with_replay_buffered(mut self, replay: bool) -> Self {
        self.replay_buffered = replay;
        self
    }

    /// Check invariants the poll loop relies on
    pub fn validate(&self) -> CaptureResult<()> {
        if self.min_interval.is_zero() {
            return Err(CaptureError::Configuration(
                "min_interval must be greater than zero".into(),
            ));
        }
        if self.min_interval > self.max_interval {
            return Err(CaptureError::Configuration(format!(
                "min_interval {:?} exceeds max_interval {:?}",
                self.min_interval, self.max_interval
            )));
        }
        if !(self.backoff_factor > 1.0) || !self.backoff_factor.is_finite() {
            return Err(CaptureError::Configuration(format!(
                "backoff_factor must be a finite value above 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.channel_capacity == 0 {
            return Err(CaptureError::Configuration(
                "channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Load configuration from the environment, falling back to defaults
    ///
    /// Environment variables:
    /// - XEVENT_MIN_INTERVAL_MS / XEVENT_MAX_INTERVAL_MS
    /// - XEVENT_BACKOFF_FACTOR
    /// - XEVENT_OVERLAP_MS
    /// - XEVENT_CHANNEL_CAPACITY
    /// - XEVENT_REGEX_BUDGET_MS
    /// - XEVENT_REPLAY_BUFFERED (1/true)
    pub fn from_env() -> CaptureResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test maps)
    pub fn from_lookup<F>(lookup: F) -> CaptureResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "XEVENT_MIN_INTERVAL_MS") {
            config.min_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "XEVENT_MAX_INTERVAL_MS") {
            config.max_interval = Duration::from_millis(ms);
        }
        if let Some(factor) = parse_var::<f64, _>(&lookup, "XEVENT_BACKOFF_FACTOR") {
            config.backoff_factor = factor;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "XEVENT_OVERLAP_MS") {
            config.overlap = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "XEVENT_CHANNEL_CAPACITY") {
            config.channel_capacity = capacity;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "XEVENT_REGEX_BUDGET_MS") {
            config.regex_budget = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("XEVENT_REPLAY_BUFFERED") {
            config.replay_buffered = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.channel_capacity, 10_000);
        assert_eq!(config.min_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = StreamConfig::from_lookup(lookup_from(&[
            ("XEVENT_MIN_INTERVAL_MS", "250"),
            ("XEVENT_MAX_INTERVAL_MS", "4000"),
            ("XEVENT_OVERLAP_MS", "2000"),
            ("XEVENT_REPLAY_BUFFERED", "true"),
        ]))
        .unwrap();

        assert_eq!(config.min_interval, Duration::from_millis(250));
        assert_eq!(config.max_interval, Duration::from_millis(4000));
        assert_eq!(config.overlap, Duration::from_secs(2));
        assert!(config.replay_buffered);
    }

    #[test]
    fn test_unparsable_value_falls_back_to_default() {
        let config =
            StreamConfig::from_lookup(lookup_from(&[("XEVENT_CHANNEL_CAPACITY", "lots")]))
                .unwrap();
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_inverted_intervals_rejected() {
        let result = StreamConfig::from_lookup(lookup_from(&[
            ("XEVENT_MIN_INTERVAL_MS", "5000"),
            ("XEVENT_MAX_INTERVAL_MS", "1000"),
        ]));
        assert!(matches!(result, Err(CaptureError::Configuration(_))));
    }

    #[test]
    fn test_backoff_factor_must_grow() {
        let config = StreamConfig::default().with_backoff_factor(1.0);
        assert!(config.validate().is_err());
        let config = StreamConfig::default().with_channel_capacity(0);
        assert!(config.validate().is_err());
    }
}
