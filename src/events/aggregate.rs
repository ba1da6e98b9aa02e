/*!
 * Fingerprint Grouping
 * Batch view that folds textually-equivalent queries into one row
 */

use super::format::format_duration_us;
use super::model::CapturedEvent;
use ahash::HashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Aggregated statistics for one query fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintGroup {
    pub fingerprint: String,
    pub sample_text: String,
    pub count: u64,
    pub total_duration_us: u64,
    pub avg_duration_us: u64,
    pub max_duration_us: u64,
    pub total_cpu_us: u64,
    pub total_logical_reads: u64,
    pub avg_duration_display: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_seen: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
}

impl FingerprintGroup {
    fn start(event: &CapturedEvent) -> Self {
        Self {
            fingerprint: event.fingerprint.clone(),
            sample_text: event.text.clone(),
            count: 0,
            total_duration_us: 0,
            avg_duration_us: 0,
            max_duration_us: 0,
            total_cpu_us: 0,
            total_logical_reads: 0,
            avg_duration_display: String::new(),
            first_seen: None,
            last_seen: None,
        }
    }

    fn absorb(&mut self, event: &CapturedEvent) {
        let counters = &event.counters;
        self.count += 1;
        self.total_duration_us = self.total_duration_us.saturating_add(counters.duration_us);
        self.max_duration_us = self.max_duration_us.max(counters.duration_us);
        self.total_cpu_us = self.total_cpu_us.saturating_add(counters.cpu_time_us);
        self.total_logical_reads = self
            .total_logical_reads
            .saturating_add(counters.logical_reads);

        if let Some(ts) = event.timestamp {
            self.first_seen = Some(self.first_seen.map_or(ts, |first| first.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |last| last.max(ts)));
        }
    }

    fn finish(mut self) -> Self {
        self.avg_duration_us = self.total_duration_us / self.count.max(1);
        self.avg_duration_display = format_duration_us(self.avg_duration_us);
        self
    }
}

/// Group events by fingerprint, heaviest total duration first
pub fn group_by_fingerprint(events: &[CapturedEvent]) -> Vec<FingerprintGroup> {
    let mut groups: HashMap<&str, FingerprintGroup> = HashMap::default();

    for event in events {
        groups
            .entry(event.fingerprint.as_str())
            .or_insert_with(|| FingerprintGroup::start(event))
            .absorb(event);
    }

    let mut groups: Vec<FingerprintGroup> =
        groups.into_values().map(FingerprintGroup::finish).collect();
    groups.sort_by(|a, b| {
        b.total_duration_us
            .cmp(&a.total_duration_us)
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
    groups
}
