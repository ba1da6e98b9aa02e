/*!
 * Event System
 * Raw buffer records, the canonical event model, and the parsers between them
 */

pub mod aggregate;
pub mod format;
pub mod kind;
pub mod model;
pub mod normalizer;
pub mod raw;
pub mod reports;

pub use aggregate::{group_by_fingerprint, FingerprintGroup};
pub use format::{format_duration_us, format_wait_ms};
pub use kind::{EventKind, RecordShape};
pub use model::{CapturedEvent, EventCounters, EventIdentity, EventOrigin, EventOutcome};
pub use normalizer::{normalize, normalize_report};
pub use raw::{RawField, RawRecord};
pub use reports::{
    parse_report, BlockedProcess, BlockingProcess, BlockingReport, DeadlockProcess,
    DeadlockReport, ReportRecord,
};
