/*!
 * Event Streaming
 * Incremental capture: adaptive polling, overlap deduplication, bounded fan-out
 */

pub mod channel;
pub mod poller;
pub mod registry;
pub mod schedule;
pub mod status;
pub mod watermark;

pub use channel::{EventChannel, Publish};
pub use poller::{CycleOutcome, PollLoop};
pub use registry::StreamRegistry;
pub use schedule::PollSchedule;
pub use status::{StreamHandle, StreamState, StreamStatus};
pub use watermark::{Admitted, Watermark};
