/*!
 * Tool Responses
 * Structured success/failure envelope returned to callers
 */

use crate::core::errors::CaptureError;
use serde::{Deserialize, Serialize};

/// Result envelope: a success flag, a message, and an optional payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Stable error kind, present on failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl<T> ToolResponse<T> {
    #[inline]
    #[must_use]
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_kind: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn failure(error: &CaptureError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
            error_kind: Some(error.kind().to_string()),
        }
    }

    /// Build from a result, with a success message derived from the payload
    pub fn from_result<F>(result: Result<T, CaptureError>, message: F) -> Self
    where
        F: FnOnce(&T) -> String,
    {
        match result {
            Ok(data) => {
                let message = message(&data);
                Self::ok(message, data)
            }
            Err(e) => Self::failure(&e),
        }
    }
}
