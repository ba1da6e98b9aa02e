/*!
 * Watermark
 * Overlap-window deduplication across consecutive fetches
 */

use crate::events::{CapturedEvent, EventIdentity};
use ahash::HashSet;
use time::OffsetDateTime;

/// Sliding watermark plus the identities seen in the previous fetch window
///
/// Anything at or before `last_seen - overlap` was already considered and is
/// never emitted again. Inside the overlap zone, identities present in the
/// previous cycle's set are duplicates. The set is replaced every cycle, so
/// memory stays bounded by one fetch window.
#[derive(Debug, Clone)]
pub struct Watermark {
    last_seen: Option<OffsetDateTime>,
    floor: Option<OffsetDateTime>,
    overlap: time::Duration,
    recent: HashSet<EventIdentity>,
}

/// Result of partitioning one fetch
#[derive(Debug, Default)]
pub struct Admitted {
    /// New events in ascending timestamp order
    pub events: Vec<CapturedEvent>,
    pub stale: usize,
    pub duplicates: usize,
}

impl Watermark {
    /// Watermark that admits everything currently buffered
    pub fn new(overlap: std::time::Duration) -> Self {
        Self {
            last_seen: None,
            floor: None,
            overlap: to_time(overlap),
            recent: HashSet::default(),
        }
    }

    /// Watermark that ignores events older than `start`
    pub fn starting_at(start: OffsetDateTime, overlap: std::time::Duration) -> Self {
        Self {
            floor: Some(start),
            ..Self::new(overlap)
        }
    }

    #[inline]
    pub fn last_seen(&self) -> Option<OffsetDateTime> {
        self.last_seen
    }

    /// Number of identities carried into the next cycle
    #[inline]
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Lower bound for the next fetch
    pub fn since(&self) -> Option<OffsetDateTime> {
        match (self.cutoff(), self.floor) {
            (Some(cutoff), Some(floor)) => Some(cutoff.max(floor)),
            (cutoff, floor) => cutoff.or(floor),
        }
    }

    fn cutoff(&self) -> Option<OffsetDateTime> {
        self.last_seen.map(|seen| seen - self.overlap)
    }

    /// Partition a fetch into stale, duplicate and new events
    ///
    /// Events without a timestamp skip the time checks and are deduplicated
    /// by identity alone.
    pub fn admit(&mut self, fetched: Vec<CapturedEvent>) -> Admitted {
        let cutoff = self.cutoff();
        let mut admitted = Admitted::default();
        let mut seen = HashSet::default();

        for event in fetched {
            if let Some(ts) = event.timestamp {
                if cutoff.is_some_and(|cutoff| ts <= cutoff) || self.floor.is_some_and(|f| ts < f) {
                    admitted.stale += 1;
                    continue;
                }
            }

            let identity = event.identity();
            let duplicate = self.recent.contains(&identity);
            seen.insert(identity);
            if duplicate {
                admitted.duplicates += 1;
            } else {
                admitted.events.push(event);
            }
        }

        self.recent = seen;
        admitted.events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        if let Some(newest) = admitted.events.iter().filter_map(|e| e.timestamp).max() {
            self.last_seen = Some(self.last_seen.map_or(newest, |seen| seen.max(newest)));
        }

        admitted
    }
}

fn to_time(duration: std::time::Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}
