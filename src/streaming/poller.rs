/*!
 * Poll Loop
 * One background task per stream: peek, fetch, deduplicate, publish
 *
 * The stop signal is observed at cycle boundaries and while sleeping, never
 * in the middle of a fetch. Errors are logged and absorbed; the next attempt
 * waits the full backoff ceiling.
 */

use super::channel::{EventChannel, Publish};
use super::schedule::PollSchedule;
use super::status::{StreamHandle, StreamState};
use super::watermark::Watermark;
use crate::buffer::{BufferHeader, ExclusionSet, ExclusionSource, SnapshotFetcher};
use crate::core::config::StreamConfig;
use crate::core::errors::CaptureResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// What one cycle found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Buffer size unchanged; nothing fetched
    Unchanged,
    /// Fetched, but every event was stale, duplicate or filtered
    Quiet,
    /// Fetched and published this many events
    Emitted(usize),
}

/// Poll loop for a single stream
pub struct PollLoop {
    handle: Arc<StreamHandle>,
    fetcher: SnapshotFetcher,
    exclusion_source: Arc<dyn ExclusionSource>,
    config: StreamConfig,
    channel: EventChannel,
    schedule: PollSchedule,
    watermark: Watermark,
    patterns: Vec<String>,
    exclusions: ExclusionSet,
    last_size: Option<u64>,
    last_dropped: Option<u64>,
    stop_rx: watch::Receiver<bool>,
}

impl PollLoop {
    pub fn new(
        handle: Arc<StreamHandle>,
        fetcher: SnapshotFetcher,
        exclusion_source: Arc<dyn ExclusionSource>,
        config: StreamConfig,
        channel: EventChannel,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        let watermark = if config.replay_buffered {
            Watermark::new(config.overlap)
        } else {
            Watermark::starting_at(handle.started_at(), config.overlap)
        };

        Self {
            schedule: PollSchedule::from_config(&config),
            handle,
            fetcher,
            exclusion_source,
            config,
            channel,
            watermark,
            patterns: Vec::new(),
            exclusions: ExclusionSet::empty(),
            last_size: None,
            last_dropped: None,
            stop_rx,
        }
    }

    /// Run until stopped; the channel closes when this returns
    pub async fn run(self) {
        let span = info_span!(
            "poll_loop",
            stream_id = %self.handle.id(),
            buffer = %self.handle.buffer()
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) {
        info!(
            replay = self.config.replay_buffered,
            min_interval_ms = self.config.min_interval.as_millis() as u64,
            max_interval_ms = self.config.max_interval.as_millis() as u64,
            "Stream started"
        );

        loop {
            if self.stop_requested() {
                break;
            }

            let delay = self.step().await;

            if self.stop_requested() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = self.stop_rx.changed() => {
                    if changed.is_err() {
                        debug!("Stop sender dropped");
                        break;
                    }
                }
            }
        }

        self.handle.set_state(StreamState::Stopped);
        info!(
            emitted = self.handle.emitted(),
            dropped = self.channel.dropped(),
            "Stream stopped"
        );
    }

    /// Run one cycle and update the schedule; returns the delay before the next
    pub async fn step(&mut self) -> Duration {
        let delay = match self.cycle().await {
            Ok(CycleOutcome::Emitted(count)) => {
                debug!(count, "Published new events");
                self.handle.set_state(StreamState::Active);
                self.schedule.on_activity()
            }
            Ok(outcome) => {
                debug!(?outcome, "No new events");
                self.handle.set_state(StreamState::Backoff);
                self.schedule.on_idle()
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Poll cycle failed");
                self.handle.record_error(e.to_string());
                self.handle.set_state(StreamState::Backoff);
                self.schedule.on_error()
            }
        };
        self.handle.record_cycle(delay);
        delay
    }

    async fn cycle(&mut self) -> CaptureResult<CycleOutcome> {
        let buffer = self.handle.buffer().clone();

        let size = self.fetcher.peek_size(&buffer).await?;
        if self.last_size == Some(size) {
            return Ok(CycleOutcome::Unchanged);
        }

        self.handle.set_state(StreamState::Fetching);
        self.refresh_exclusions();

        let since = self.watermark.since();
        let snapshot = self
            .fetcher
            .fetch(&buffer, since, self.handle.filter(), &self.exclusions)
            .await?;
        self.last_size = Some(size);
        self.note_buffer_drops(&snapshot.header);

        let fetched = snapshot.events.len();
        let admitted = self.watermark.admit(snapshot.events);
        debug!(
            size,
            fetched,
            stale = admitted.stale,
            duplicates = admitted.duplicates,
            fresh = admitted.events.len(),
            "Partitioned snapshot"
        );

        if admitted.events.is_empty() {
            return Ok(CycleOutcome::Quiet);
        }

        let count = admitted.events.len();
        let newest = admitted.events.iter().filter_map(|e| e.timestamp).max();
        let mut evicted = 0u64;
        for event in admitted.events {
            if let Publish::Evicted(n) = self.channel.publish(event) {
                evicted += n;
            }
        }
        if evicted > 0 {
            debug!(evicted, "Channel full, dropped oldest events");
            self.handle.record_dropped(evicted);
        }
        self.handle.record_emitted(count as u64, newest);

        Ok(CycleOutcome::Emitted(count))
    }

    /// Re-read exclusion patterns; recompile only when the list changed
    fn refresh_exclusions(&mut self) {
        let patterns = self
            .exclusion_source
            .exclusion_patterns(self.handle.buffer());
        if patterns == self.patterns {
            self.exclusions.reset();
            return;
        }
        debug!(count = patterns.len(), "Exclusion patterns changed");
        self.exclusions = ExclusionSet::compile(&patterns, self.config.regex_budget);
        self.patterns = patterns;
    }

    fn note_buffer_drops(&mut self, header: &BufferHeader) {
        let Some(dropped) = header.dropped_count else {
            return;
        };
        if let Some(previous) = self.last_dropped {
            if dropped > previous {
                warn!(
                    overwritten = dropped - previous,
                    total = dropped,
                    "Ring buffer overwrote events between polls"
                );
            }
        }
        self.last_dropped = Some(dropped);
    }

    #[inline]
    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }
}
