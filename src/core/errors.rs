/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capture engine errors with miette diagnostics
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum CaptureError {
    #[error("Transport error: {0}")]
    #[diagnostic(
        code(capture::transport),
        help("The remote buffer could not be reached. The stream retries on its next cycle.")
    )]
    Transport(String),

    #[error("Timeout: {0}")]
    #[diagnostic(
        code(capture::timeout),
        help("The remote call exceeded its timeout. Check server load or raise the timeout.")
    )]
    Timeout(String),

    #[error("Malformed payload: {0}")]
    #[diagnostic(
        code(capture::malformed_payload),
        help("The buffer content could not be parsed. Raw content is preserved on degraded records.")
    )]
    MalformedPayload(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    #[diagnostic(
        code(capture::invalid_pattern),
        help("Exclusion patterns use regex syntax. Invalid patterns never match.")
    )]
    InvalidPattern { pattern: String, reason: String },

    #[error("Stream id collision: {0}")]
    #[diagnostic(
        code(capture::stream_id_collision),
        help("A generated stream id is already registered. Retry the start call.")
    )]
    StreamIdCollision(String),

    #[error("Stream {0} not found")]
    #[diagnostic(
        code(capture::stream_not_found),
        help("The stream may have been stopped or never existed. List streams to check.")
    )]
    StreamNotFound(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(capture::configuration),
        help("Invalid configuration. Review interval, overlap and capacity parameters.")
    )]
    Configuration(String),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(capture::io),
        help("Filesystem or I/O operation failed. Check file permissions and paths.")
    )]
    Io(String),

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(capture::internal),
        help("An unexpected internal error occurred. Please report this issue.")
    )]
    Internal(String),
}

impl CaptureError {
    /// Whether the error is a remote hiccup the poll loop should ride out
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CaptureError::Transport(_) | CaptureError::Timeout(_) | CaptureError::Io(_)
        )
    }

    /// Stable snake_case name used in structured responses
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Transport(_) => "transport",
            CaptureError::Timeout(_) => "timeout",
            CaptureError::MalformedPayload(_) => "malformed_payload",
            CaptureError::InvalidPattern { .. } => "invalid_pattern",
            CaptureError::StreamIdCollision(_) => "stream_id_collision",
            CaptureError::StreamNotFound(_) => "stream_not_found",
            CaptureError::Configuration(_) => "configuration",
            CaptureError::Io(_) => "io",
            CaptureError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<quick_xml::Error> for CaptureError {
    fn from(err: quick_xml::Error) -> Self {
        CaptureError::MalformedPayload(err.to_string())
    }
}

/// Result type for capture operations
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
