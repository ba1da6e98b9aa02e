/*!
 * Stream Registry
 * Owns every running poll loop, keyed by generated stream id
 */

use super::channel::EventChannel;
use super::poller::PollLoop;
use super::status::{StreamHandle, StreamStatus};
use crate::buffer::{BufferSource, EventFilter, ExclusionSource, SnapshotFetcher};
use crate::core::config::StreamConfig;
use crate::core::errors::{CaptureError, CaptureResult};
use crate::core::limits::STREAM_ID_SUFFIX_LEN;
use crate::core::types::{BufferId, StreamId};
use crate::events::CapturedEvent;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

struct StreamEntry {
    handle: Arc<StreamHandle>,
    reader: flume::Receiver<CapturedEvent>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Concurrent map of active streams
///
/// Map shards are locked only for insert, remove and lookup; poll loops never
/// touch the map.
pub struct StreamRegistry {
    streams: Arc<DashMap<StreamId, StreamEntry>>,
    fetcher: SnapshotFetcher,
    exclusions: Arc<dyn ExclusionSource>,
    config: StreamConfig,
}

impl StreamRegistry {
    pub fn new(
        source: Arc<dyn BufferSource>,
        exclusions: Arc<dyn ExclusionSource>,
        config: StreamConfig,
    ) -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            fetcher: SnapshotFetcher::new(source),
            exclusions,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Fetcher sharing this registry's buffer source, for batch reads
    #[inline]
    pub fn fetcher(&self) -> &SnapshotFetcher {
        &self.fetcher
    }

    /// Start a poll loop for `target`
    ///
    /// Fails with [`CaptureError::Internal`] when called outside a Tokio runtime.
    pub fn start(&self, target: impl Into<BufferId>, filter: EventFilter) -> CaptureResult<StreamId> {
        let target = target.into();
        let id = generate_id(&target);
        self.spawn_stream(id, target, filter)
    }

    pub(crate) fn spawn_stream(
        &self,
        id: StreamId,
        target: BufferId,
        filter: EventFilter,
    ) -> CaptureResult<StreamId> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CaptureError::Internal(format!("stream {} cannot start without a Tokio runtime: {}", id, e))
        })?;

        let slot = match self.streams.entry(id.clone()) {
            Entry::Occupied(_) => {
                warn!(stream_id = %id, "Generated stream id already registered");
                return Err(CaptureError::StreamIdCollision(id));
            }
            Entry::Vacant(slot) => slot,
        };

        let handle = Arc::new(StreamHandle::new(
            id.clone(),
            target.clone(),
            filter,
            self.config.min_interval,
        ));
        let (channel, reader) = EventChannel::bounded(self.config.channel_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);

        let poll = PollLoop::new(
            Arc::clone(&handle),
            self.fetcher.clone(),
            Arc::clone(&self.exclusions),
            self.config.clone(),
            channel,
            stop_rx,
        );
        let task = runtime.spawn(poll.run());

        slot.insert(StreamEntry {
            handle,
            reader,
            stop_tx,
            task,
        });

        info!(stream_id = %id, buffer = %target, "Registered stream");
        Ok(id)
    }

    /// Signal a stream to stop and forget it; unknown ids are a no-op
    ///
    /// Returns whether a stream was removed. The loop exits after its current
    /// cycle, closing the channel once readers drain it.
    pub fn stop(&self, id: &str) -> bool {
        match self.streams.remove(id) {
            Some((_, entry)) => {
                let _ = entry.stop_tx.send(true);
                info!(stream_id = %id, emitted = entry.handle.emitted(), "Stopping stream");
                true
            }
            None => false,
        }
    }

    /// Receive side of a stream's channel
    pub fn read(&self, id: &str) -> Option<flume::Receiver<CapturedEvent>> {
        self.streams.get(id).map(|entry| entry.reader.clone())
    }

    pub fn status(&self, id: &str) -> Option<StreamStatus> {
        self.streams.get(id).map(|entry| entry.handle.status())
    }

    /// Snapshot of every stream's counters, oldest first
    pub fn list(&self) -> Vec<StreamStatus> {
        let mut statuses: Vec<StreamStatus> = self
            .streams
            .iter()
            .map(|entry| entry.value().handle.status())
            .collect();
        statuses.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        statuses
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Stop every stream and wait for the loops to exit
    pub async fn shutdown(&self) {
        let ids: Vec<StreamId> = self.streams.iter().map(|e| e.key().clone()).collect();
        let mut tasks = Vec::with_capacity(ids.len());

        for id in ids {
            if let Some((_, entry)) = self.streams.remove(&id) {
                let _ = entry.stop_tx.send(true);
                tasks.push((id, entry.task));
            }
        }

        let count = tasks.len();
        for (id, task) in tasks {
            if let Err(e) = task.await {
                warn!(stream_id = %id, error = %e, "Poll loop ended abnormally");
            }
        }
        info!(streams = count, "Stream registry shut down");
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.streams.len())
            .field("config", &self.config)
            .finish()
    }
}

fn generate_id(target: &BufferId) -> StreamId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", target, &suffix[..STREAM_ID_SUFFIX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{MemoryBuffer, NoExclusions};
    use pretty_assertions::assert_eq;

    fn registry() -> StreamRegistry {
        StreamRegistry::new(
            Arc::new(MemoryBuffer::new()),
            Arc::new(NoExclusions),
            StreamConfig::responsive(),
        )
    }

    #[test]
    fn test_generated_ids_carry_target() {
        let id = generate_id(&BufferId::new("orders"));
        assert!(id.starts_with("orders-"));
        assert_eq!(id.len(), "orders-".len() + STREAM_ID_SUFFIX_LEN);
    }

    #[tokio::test]
    async fn test_start_read_stop() {
        let registry = registry();
        let id = registry.start("orders", EventFilter::new()).unwrap();

        assert!(registry.read(&id).is_some());
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].target, BufferId::new("orders"));

        assert!(registry.stop(&id));
        assert!(!registry.stop(&id));
        assert!(registry.read(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_start_outside_runtime_is_an_error() {
        let registry = registry();
        let err = registry.start("orders", EventFilter::new()).unwrap_err();
        assert!(matches!(err, CaptureError::Internal(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_is_noop() {
        assert!(!registry().stop("missing-00000000"));
    }

    #[tokio::test]
    async fn test_id_collision_rejected() {
        let registry = registry();
        registry
            .spawn_stream("fixed".into(), BufferId::new("a"), EventFilter::new())
            .unwrap();
        let err = registry
            .spawn_stream("fixed".into(), BufferId::new("a"), EventFilter::new())
            .unwrap_err();

        assert_eq!(err, CaptureError::StreamIdCollision("fixed".into()));
        assert_eq!(registry.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let registry = registry();
        let a = registry.start("a", EventFilter::new()).unwrap();
        registry.start("b", EventFilter::new()).unwrap();
        let reader = registry.read(&a).unwrap();

        registry.shutdown().await;
        assert!(registry.is_empty());
        assert!(reader.recv_async().await.is_err());
    }
}
