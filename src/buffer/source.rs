/*!
 * Buffer Collaborators
 * Abstractions over the remote ring buffer and per-stream session settings
 */

use crate::core::errors::CaptureResult;
use crate::core::types::BufferId;
use ahash::HashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use time::OffsetDateTime;

/// Read access to a remote event buffer
///
/// Implementations own their transport and its timeouts; the poll loop never
/// cancels a call in flight.
pub trait BufferSource: Send + Sync {
    /// Cheap change detector: current buffer size (bytes or event count)
    fn peek_size<'a>(&'a self, buffer: &'a BufferId) -> BoxFuture<'a, CaptureResult<u64>>;

    /// Whole buffer content as one XML blob
    ///
    /// `since` is a hint; implementations may return older records too.
    fn read_buffer<'a>(
        &'a self,
        buffer: &'a BufferId,
        since: Option<OffsetDateTime>,
    ) -> BoxFuture<'a, CaptureResult<String>>;
}

/// Supplies the current exclusion patterns for a stream
///
/// Read once per poll cycle so edits apply without restarting the stream.
pub trait ExclusionSource: Send + Sync {
    fn exclusion_patterns(&self, buffer: &BufferId) -> Vec<String>;
}

/// No exclusions for any buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExclusions;

impl ExclusionSource for NoExclusions {
    fn exclusion_patterns(&self, _buffer: &BufferId) -> Vec<String> {
        Vec::new()
    }
}

/// In-process, mutable exclusion pattern table
#[derive(Debug, Default)]
pub struct ExclusionTable {
    patterns: RwLock<HashMap<BufferId, Vec<String>>>,
}

impl ExclusionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the patterns for one buffer
    pub fn set(&self, buffer: BufferId, patterns: Vec<String>) {
        self.patterns.write().insert(buffer, patterns);
    }

    pub fn clear(&self, buffer: &BufferId) {
        self.patterns.write().remove(buffer);
    }
}

impl ExclusionSource for ExclusionTable {
    fn exclusion_patterns(&self, buffer: &BufferId) -> Vec<String> {
        self.patterns.read().get(buffer).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_table_updates() {
        let table = ExclusionTable::new();
        let buffer = BufferId::new("orders");
        assert!(table.exclusion_patterns(&buffer).is_empty());

        table.set(buffer.clone(), vec!["^waitfor".into()]);
        assert_eq!(table.exclusion_patterns(&buffer), vec!["^waitfor".to_string()]);

        table.clear(&buffer);
        assert!(NoExclusions.exclusion_patterns(&buffer).is_empty());
        assert!(table.exclusion_patterns(&buffer).is_empty());
    }
}
