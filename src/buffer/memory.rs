/*!
 * In-Memory Buffer
 * Ring buffer simulator rendering the same XML shape as a live server
 */

use super::source::BufferSource;
use crate::core::errors::{CaptureError, CaptureResult};
use crate::core::types::BufferId;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use quick_xml::escape::escape;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct Inner {
    records: Mutex<VecDeque<String>>,
    capacity: Option<usize>,
    processed: AtomicU64,
    dropped: AtomicU64,
    reads: AtomicU64,
    failing: AtomicBool,
}

/// Shared, cloneable in-process ring buffer
///
/// Serves every [`BufferId`] with the same content. When a capacity is set,
/// pushing past it overwrites the oldest record and bumps `droppedCount`.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    inner: Arc<Inner>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: Some(capacity.max(1)),
                ..Inner::default()
            }),
        }
    }

    /// Append one complete `<event>` element
    pub fn push_raw(&self, record: impl Into<String>) {
        let mut records = self.inner.records.lock();
        records.push_back(record.into());
        if let Some(capacity) = self.inner.capacity {
            while records.len() > capacity {
                records.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.inner.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a completed batch record
    pub fn push_statement(
        &self,
        timestamp: OffsetDateTime,
        session_id: u32,
        duration_us: u64,
        text: &str,
    ) {
        let ts = timestamp.format(&Rfc3339).unwrap_or_default();
        self.push_raw(format!(
            r#"<event name="sql_batch_completed" package="sqlserver" timestamp="{ts}"><data name="duration"><value>{duration_us}</value></data><data name="batch_text"><value>{}</value></data><action name="session_id" package="sqlserver"><value>{session_id}</value></action></event>"#,
            escape(text)
        ));
    }

    /// Make every subsequent call fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.inner.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of full reads served so far
    pub fn reads(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    fn check_available(&self, buffer: &BufferId) -> CaptureResult<()> {
        if self.inner.failing.load(Ordering::Relaxed) {
            return Err(CaptureError::Transport(format!(
                "buffer {} is unreachable",
                buffer
            )));
        }
        Ok(())
    }

    fn size(&self, buffer: &BufferId) -> CaptureResult<u64> {
        self.check_available(buffer)?;
        Ok(self.inner.processed.load(Ordering::Relaxed))
    }

    fn content(&self, buffer: &BufferId) -> CaptureResult<String> {
        self.check_available(buffer)?;
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.render())
    }

    fn render(&self) -> String {
        let records = self.inner.records.lock();
        let mut xml = format!(
            r#"<RingBufferTarget truncated="0" processingTime="0" totalEventsProcessed="{}" eventCount="{}" droppedCount="{}" memoryUsed="{}">"#,
            self.inner.processed.load(Ordering::Relaxed),
            records.len(),
            self.inner.dropped.load(Ordering::Relaxed),
            records.iter().map(String::len).sum::<usize>(),
        );
        for record in records.iter() {
            xml.push_str(record);
        }
        xml.push_str("</RingBufferTarget>");
        xml
    }
}

impl BufferSource for MemoryBuffer {
    fn peek_size<'a>(&'a self, buffer: &'a BufferId) -> BoxFuture<'a, CaptureResult<u64>> {
        Box::pin(async move { self.size(buffer) })
    }

    fn read_buffer<'a>(
        &'a self,
        buffer: &'a BufferId,
        _since: Option<OffsetDateTime>,
    ) -> BoxFuture<'a, CaptureResult<String>> {
        Box::pin(async move { self.content(buffer) })
    }
}
