/*!
 * Stream Status
 * Shared per-stream counters written by the poll loop, read by the registry
 */

use crate::buffer::EventFilter;
use crate::core::types::{BufferId, StreamId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

/// Poll loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StreamState {
    Idle = 0,
    Fetching = 1,
    /// Last cycle emitted events; polling at the floor interval
    Active = 2,
    /// Last cycle found nothing new or failed; interval growing
    Backoff = 3,
    Stopped = 4,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StreamState::Fetching,
            2 => StreamState::Active,
            3 => StreamState::Backoff,
            4 => StreamState::Stopped,
            _ => StreamState::Idle,
        }
    }
}

/// Live handle for one stream
///
/// Counters are atomics so status reads never contend with the loop.
#[derive(Debug)]
pub struct StreamHandle {
    id: StreamId,
    buffer: BufferId,
    filter: EventFilter,
    started_at: OffsetDateTime,
    state: AtomicU8,
    emitted: AtomicU64,
    dropped: AtomicU64,
    cycles: AtomicU64,
    errors: AtomicU64,
    interval_ms: AtomicU64,
    last_event_at: Mutex<Option<OffsetDateTime>>,
    last_error: Mutex<Option<String>>,
}

impl StreamHandle {
    pub fn new(id: StreamId, buffer: BufferId, filter: EventFilter, interval: Duration) -> Self {
        Self {
            id,
            buffer,
            filter,
            started_at: OffsetDateTime::now_utc(),
            state: AtomicU8::new(StreamState::Idle as u8),
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            interval_ms: AtomicU64::new(interval.as_millis() as u64),
            last_event_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn buffer(&self) -> &BufferId {
        &self.buffer
    }

    #[inline]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    #[inline]
    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    #[inline]
    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn record_cycle(&self, interval: Duration) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_emitted(&self, count: u64, newest: Option<OffsetDateTime>) {
        self.emitted.fetch_add(count, Ordering::Relaxed);
        if let Some(newest) = newest {
            let mut last = self.last_event_at.lock();
            *last = Some(last.map_or(newest, |prev| prev.max(newest)));
        }
    }

    pub(crate) fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self, message: String) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(message);
    }

    /// Point-in-time copy of every counter
    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            id: self.id.clone(),
            target: self.buffer.clone(),
            state: self.state(),
            started_at: self.started_at,
            emitted: self.emitted(),
            last_event_at: *self.last_event_at.lock(),
            dropped: self.dropped.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            interval_ms: self.interval_ms.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Serializable status snapshot of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub id: StreamId,
    pub target: BufferId,
    pub state: StreamState,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub emitted: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_event_at: Option<OffsetDateTime>,
    pub dropped: u64,
    pub cycles: u64,
    pub errors: u64,
    pub interval_ms: u64,
    pub last_error: Option<String>,
}
