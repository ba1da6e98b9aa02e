/*!
 * Extended Event Capture Library
 * Incremental capture and streaming of database diagnostic ring buffers
 */

pub mod api;
pub mod buffer;
pub mod core;
pub mod events;
pub mod fingerprint;
pub mod monitoring;
pub mod streaming;

// Re-exports
pub use api::{StreamApi, ToolResponse};
pub use buffer::{
    AttributeMatch, BufferSource, EventFilter, ExclusionSet, ExclusionSource, ExclusionTable,
    FileBuffer, MemoryBuffer, NoExclusions, Snapshot, SnapshotFetcher,
};
pub use crate::core::{BufferId, CaptureError, CaptureResult, StreamConfig, StreamId};
pub use events::{
    group_by_fingerprint, CapturedEvent, EventKind, FingerprintGroup, ReportRecord,
};
pub use fingerprint::{fingerprint, normalize_query};
pub use monitoring::init_tracing;
pub use streaming::{StreamRegistry, StreamState, StreamStatus};
