/*!
 * Captured Event Model
 * Canonical record produced once per raw buffer entry
 */

use super::format::format_duration_us;
use super::kind::EventKind;
use crate::core::limits::MALFORMED_MARKER;
use crate::fingerprint::fingerprint;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Where an event came from on the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOrigin {
    pub database: Option<String>,
    pub application: Option<String>,
    pub host: Option<String>,
    pub login: Option<String>,
    pub session_id: Option<u32>,
    pub transaction_id: Option<u64>,
    pub request_id: Option<u32>,
}

/// How the event ended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOutcome {
    /// Result code text (`OK`, `Abort`, `Error`)
    pub result: Option<String>,
    pub error_number: Option<i32>,
    pub error_message: Option<String>,
}

/// Counters reported by completed events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounters {
    pub duration_us: u64,
    pub cpu_time_us: u64,
    pub logical_reads: u64,
    pub physical_reads: u64,
    pub writes: u64,
    pub row_count: u64,
}

/// Uniform event record handed to stream consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub kind: EventKind,
    /// Server-side timestamp, absent when the record carried none
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub counters: EventCounters,
    pub text: String,
    pub object_name: Option<String>,
    pub origin: EventOrigin,
    pub outcome: EventOutcome,
    pub fingerprint: String,
    pub duration_display: String,
}

impl CapturedEvent {
    /// Assemble an event, deriving fingerprint and duration display
    pub fn new(
        kind: EventKind,
        timestamp: Option<OffsetDateTime>,
        counters: EventCounters,
        text: String,
        origin: EventOrigin,
        outcome: EventOutcome,
    ) -> Self {
        Self {
            fingerprint: fingerprint(&text),
            duration_display: format_duration_us(counters.duration_us),
            kind,
            timestamp,
            counters,
            text,
            object_name: None,
            origin,
            outcome,
        }
    }

    pub fn with_object_name(mut self, object_name: Option<String>) -> Self {
        self.object_name = object_name;
        self
    }

    /// Placeholder for a record that could not be parsed; raw text is kept
    pub fn degraded(kind: EventKind, raw: &str) -> Self {
        Self::new(
            kind,
            None,
            EventCounters::default(),
            raw.to_string(),
            EventOrigin::default(),
            EventOutcome {
                result: Some(MALFORMED_MARKER.to_string()),
                ..EventOutcome::default()
            },
        )
    }

    /// Whether this record is a parse-failure placeholder
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.outcome.result.as_deref() == Some(MALFORMED_MARKER)
    }

    /// Cheap composite identity used to suppress re-delivery in overlap windows
    #[inline]
    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            timestamp_ns: self.timestamp.map(|ts| ts.unix_timestamp_nanos()),
            session_id: self.origin.session_id,
            kind: self.kind.clone(),
            duration_us: self.counters.duration_us,
        }
    }
}

/// Heuristic event identity: timestamp, session, kind and duration
///
/// Two distinct events sharing all four fields collapse into one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventIdentity {
    pub timestamp_ns: Option<i128>,
    pub session_id: Option<u32>,
    pub kind: EventKind,
    pub duration_us: u64,
}
