/*!
 * File Buffer
 * Serves ring buffer dumps saved to disk
 */

use super::source::BufferSource;
use crate::core::errors::CaptureResult;
use crate::core::types::BufferId;
use futures::future::BoxFuture;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::trace;

/// Buffer source backed by files on disk
///
/// A buffer id resolves to `<root>/<id>.xml`, unless the root itself is a
/// file, in which case every id reads that file. The change detector is the
/// file length, so a dump rewritten in place is picked up on the next cycle.
#[derive(Debug, Clone)]
pub struct FileBuffer {
    root: PathBuf,
}

impl FileBuffer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn file_len(&self, buffer: &BufferId) -> CaptureResult<u64> {
        let path = self.path_for(buffer);
        let len = tokio::fs::metadata(&path).await?.len();
        trace!(path = %path.display(), len, "Peeked buffer file");
        Ok(len)
    }

    async fn file_content(&self, buffer: &BufferId) -> CaptureResult<String> {
        Ok(tokio::fs::read_to_string(self.path_for(buffer)).await?)
    }

    fn path_for(&self, buffer: &BufferId) -> PathBuf {
        if self.root.is_dir() {
            self.root.join(format!("{}.xml", buffer.as_str()))
        } else {
            self.root.clone()
        }
    }
}

impl BufferSource for FileBuffer {
    fn peek_size<'a>(&'a self, buffer: &'a BufferId) -> BoxFuture<'a, CaptureResult<u64>> {
        Box::pin(self.file_len(buffer))
    }

    fn read_buffer<'a>(
        &'a self,
        buffer: &'a BufferId,
        _since: Option<OffsetDateTime>,
    ) -> BoxFuture<'a, CaptureResult<String>> {
        Box::pin(self.file_content(buffer))
    }
}
