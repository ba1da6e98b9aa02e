/*!
 * Stream API
 * Caller-facing operations that never fail with a panic or a bare error
 */

use super::response::ToolResponse;
use crate::buffer::{EventFilter, ExclusionSet, Snapshot};
use crate::core::errors::CaptureError;
use crate::core::types::{BufferId, StreamId};
use crate::events::{group_by_fingerprint, CapturedEvent, EventKind, FingerprintGroup, ReportRecord};
use crate::monitoring::span_operation;
use crate::streaming::{StreamRegistry, StreamStatus};
use std::sync::Arc;

/// Facade turning registry and fetcher results into [`ToolResponse`]s
#[derive(Debug, Clone)]
pub struct StreamApi {
    registry: Arc<StreamRegistry>,
}

impl StreamApi {
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn start_stream(&self, target: &str, filter: EventFilter) -> ToolResponse<StreamId> {
        ToolResponse::from_result(self.registry.start(target, filter), |id| {
            format!("Started stream {} on {}", id, target)
        })
    }

    /// Idempotent: stopping an unknown stream still succeeds
    pub fn stop_stream(&self, id: &str) -> ToolResponse<bool> {
        let stopped = self.registry.stop(id);
        let message = if stopped {
            format!("Stopped stream {}", id)
        } else {
            format!("Stream {} was not running", id)
        };
        ToolResponse::ok(message, stopped)
    }

    pub fn list_streams(&self) -> ToolResponse<Vec<StreamStatus>> {
        let streams = self.registry.list();
        ToolResponse::ok(format!("{} active streams", streams.len()), streams)
    }

    pub fn stream_status(&self, id: &str) -> ToolResponse<StreamStatus> {
        match self.registry.status(id) {
            Some(status) => ToolResponse::ok(format!("Stream {}", id), status),
            None => ToolResponse::failure(&CaptureError::StreamNotFound(id.to_string())),
        }
    }

    /// Take up to `max` events already queued on a stream, without waiting
    pub fn drain_stream(&self, id: &str, max: usize) -> ToolResponse<Vec<CapturedEvent>> {
        let Some(reader) = self.registry.read(id) else {
            return ToolResponse::failure(&CaptureError::StreamNotFound(id.to_string()));
        };
        let events: Vec<CapturedEvent> = reader.try_iter().take(max).collect();
        ToolResponse::ok(format!("{} events", events.len()), events)
    }

    /// One-off filtered read of a buffer
    pub async fn fetch_events(
        &self,
        buffer: &str,
        filter: &EventFilter,
        exclusion_patterns: &[String],
    ) -> ToolResponse<Snapshot> {
        let span = span_operation("fetch_events");
        let result = self.snapshot(buffer, filter, exclusion_patterns).await;
        record(&span, &result, |snapshot| snapshot.events.len());
        ToolResponse::from_result(result, |snapshot| {
            format!(
                "{} events ({} malformed)",
                snapshot.events.len(),
                snapshot.malformed
            )
        })
    }

    /// Filtered read folded into per-fingerprint statistics
    pub async fn fetch_grouped(
        &self,
        buffer: &str,
        filter: &EventFilter,
        exclusion_patterns: &[String],
    ) -> ToolResponse<Vec<FingerprintGroup>> {
        let span = span_operation("fetch_grouped");
        let result = self
            .snapshot(buffer, filter, exclusion_patterns)
            .await
            .map(|snapshot| group_by_fingerprint(&snapshot.events));
        record(&span, &result, Vec::len);
        ToolResponse::from_result(result, |groups| format!("{} query fingerprints", groups.len()))
    }

    /// Deadlock and blocking reports; an empty `kinds` selects both
    pub async fn fetch_reports(
        &self,
        buffer: &str,
        kinds: &[EventKind],
    ) -> ToolResponse<Vec<ReportRecord>> {
        let span = span_operation("fetch_reports");
        let result = self
            .registry
            .fetcher()
            .fetch_reports(&BufferId::new(buffer), kinds)
            .await;
        record(&span, &result, Vec::len);
        ToolResponse::from_result(result, |reports| {
            let degraded = reports.iter().filter(|r| r.is_degraded()).count();
            format!("{} reports ({} degraded)", reports.len(), degraded)
        })
    }

    async fn snapshot(
        &self,
        buffer: &str,
        filter: &EventFilter,
        exclusion_patterns: &[String],
    ) -> Result<Snapshot, CaptureError> {
        let exclusions =
            ExclusionSet::compile(exclusion_patterns, self.registry.config().regex_budget);
        self.registry
            .fetcher()
            .fetch(&BufferId::new(buffer), filter.since, filter, &exclusions)
            .await
    }
}

fn record<T>(
    span: &crate::monitoring::OperationSpan,
    result: &Result<T, CaptureError>,
    items: impl Fn(&T) -> usize,
) {
    match result {
        Ok(value) => {
            span.record_items(items(value));
            span.record_result(true);
        }
        Err(e) => span.record_error(&e.to_string()),
    }
}
