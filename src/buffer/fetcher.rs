/*!
 * Snapshot Fetcher
 * Reads a buffer once and normalizes it record by record
 */

use super::filter::{EventFilter, ExclusionSet};
use super::reader::{BufferHeader, RecordItem, RecordReader, RecordSlice};
use super::source::BufferSource;
use crate::core::errors::CaptureResult;
use crate::core::limits::MALFORMED_MARKER;
use crate::core::types::BufferId;
use crate::events::normalizer::parse_timestamp;
use crate::events::{
    normalize, normalize_report, CapturedEvent, EventKind, RawRecord, RecordShape, ReportRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// One normalized read of a buffer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub header: BufferHeader,
    /// Standard-shape events in buffer order, after filtering
    pub events: Vec<CapturedEvent>,
    /// Records that could only be kept in degraded form
    pub malformed: usize,
}

/// Fetches and normalizes buffer snapshots through a [`BufferSource`]
#[derive(Clone)]
pub struct SnapshotFetcher {
    source: Arc<dyn BufferSource>,
}

impl SnapshotFetcher {
    pub fn new(source: Arc<dyn BufferSource>) -> Self {
        Self { source }
    }

    /// Cheap change detector, forwarded to the source
    pub async fn peek_size(&self, buffer: &BufferId) -> CaptureResult<u64> {
        self.source.peek_size(buffer).await
    }

    /// Fetch standard-shape events at or after `since`
    ///
    /// Report-shaped records are skipped without parsing their bodies. Records
    /// that fail to parse are kept as degraded events and never fail the fetch.
    pub async fn fetch(
        &self,
        buffer: &BufferId,
        since: Option<OffsetDateTime>,
        filter: &EventFilter,
        exclusions: &ExclusionSet,
    ) -> CaptureResult<Snapshot> {
        let blob = self.source.read_buffer(buffer, since).await?;
        let mut reader = RecordReader::new(&blob);
        let mut snapshot = Snapshot::default();
        let mut skipped_reports = 0usize;

        for item in reader.by_ref() {
            let event = match item {
                RecordItem::Record(slice) => {
                    let kind = EventKind::from_name(&slice.name);
                    match kind.shape() {
                        RecordShape::XmlPayload => {
                            skipped_reports += 1;
                            continue;
                        }
                        RecordShape::Standard => match parse_slice(&slice) {
                            Ok(record) => normalize(&record),
                            Err(e) => {
                                debug!(buffer = %buffer, kind = %kind, error = %e, "Keeping unparsable record as degraded");
                                snapshot.malformed += 1;
                                degraded_event(kind, slice.timestamp.as_deref(), &slice.body)
                            }
                        },
                    }
                }
                RecordItem::Malformed {
                    name,
                    timestamp,
                    raw,
                    error,
                } => {
                    let kind = malformed_kind(name.as_deref());
                    if kind.shape() == RecordShape::XmlPayload {
                        skipped_reports += 1;
                        continue;
                    }
                    warn!(buffer = %buffer, kind = %kind, error = %error, "Skipping past malformed record");
                    snapshot.malformed += 1;
                    degraded_event(kind, timestamp.as_deref(), raw)
                }
            };

            if let (Some(since), Some(ts)) = (since, event.timestamp) {
                if ts < since {
                    continue;
                }
            }
            if !filter.matches(&event) {
                continue;
            }
            if !exclusions.is_empty() && exclusions.excludes(&event.text) {
                continue;
            }
            snapshot.events.push(event);
        }

        snapshot.header = reader.header().clone();
        log_header(buffer, &snapshot.header);
        debug!(
            buffer = %buffer,
            events = snapshot.events.len(),
            malformed = snapshot.malformed,
            skipped_reports,
            "Fetched buffer snapshot"
        );

        Ok(snapshot)
    }

    /// Fetch deadlock / blocking reports
    ///
    /// An empty `kinds` slice selects every report kind.
    pub async fn fetch_reports(
        &self,
        buffer: &BufferId,
        kinds: &[EventKind],
    ) -> CaptureResult<Vec<ReportRecord>> {
        let blob = self.source.read_buffer(buffer, None).await?;
        let mut reports = Vec::new();

        for item in RecordReader::new(&blob) {
            let report = match item {
                RecordItem::Record(slice) => {
                    let kind = EventKind::from_name(&slice.name);
                    if kind.shape() != RecordShape::XmlPayload || !wanted(kinds, &kind) {
                        continue;
                    }
                    match parse_slice(&slice) {
                        Ok(record) => normalize_report(&record),
                        Err(e) => {
                            warn!(buffer = %buffer, kind = %kind, error = %e, "Report record has no readable payload");
                            degraded_report(kind, parse_timestamp(slice.timestamp.as_deref()), &slice.body)
                        }
                    }
                }
                RecordItem::Malformed {
                    name,
                    timestamp,
                    raw,
                    error,
                } => {
                    let kind = malformed_kind(name.as_deref());
                    // Unnamed spans may have been reports; keep them visible
                    if name.is_some()
                        && (kind.shape() != RecordShape::XmlPayload || !wanted(kinds, &kind))
                    {
                        continue;
                    }
                    warn!(buffer = %buffer, kind = %kind, error = %error, "Skipping past malformed record");
                    degraded_report(kind, parse_timestamp(timestamp.as_deref()), raw)
                }
            };
            reports.push(report);
        }

        info!(
            buffer = %buffer,
            reports = reports.len(),
            degraded = reports.iter().filter(|r| r.is_degraded()).count(),
            "Fetched buffer reports"
        );
        Ok(reports)
    }
}

impl std::fmt::Debug for SnapshotFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFetcher").finish_non_exhaustive()
    }
}

fn parse_slice(slice: &RecordSlice<'_>) -> CaptureResult<RawRecord> {
    RawRecord::parse_body(slice.name.clone(), slice.timestamp.clone(), &slice.body)
}

fn degraded_event(kind: EventKind, timestamp: Option<&str>, raw: &str) -> CapturedEvent {
    let mut event = CapturedEvent::degraded(kind, raw);
    event.timestamp = parse_timestamp(timestamp);
    event
}

/// Kind of a record whose body could not be read
fn malformed_kind(name: Option<&str>) -> EventKind {
    match name {
        Some(name) => EventKind::from_name(name),
        None => EventKind::Other(MALFORMED_MARKER.to_string()),
    }
}

#[inline]
fn wanted(kinds: &[EventKind], kind: &EventKind) -> bool {
    kinds.is_empty() || kinds.contains(kind)
}

fn degraded_report(kind: EventKind, timestamp: Option<OffsetDateTime>, raw: &str) -> ReportRecord {
    ReportRecord::Degraded {
        kind,
        timestamp,
        raw: raw.to_string(),
        marker: MALFORMED_MARKER.to_string(),
    }
}

fn log_header(buffer: &BufferId, header: &BufferHeader) {
    match header.dropped_count {
        Some(dropped) if dropped > 0 => debug!(
            buffer = %buffer,
            dropped,
            event_count = ?header.event_count,
            "Ring buffer has overwritten events"
        ),
        _ => {}
    }
    if header.truncated {
        warn!(buffer = %buffer, "Ring buffer content was truncated by the server");
    }
}
