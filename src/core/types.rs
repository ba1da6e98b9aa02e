/*!
 * Core Types
 * Common types used across the capture engine
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stream identifier (target name plus random suffix)
pub type StreamId = String;

/// Remote event session / buffer identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferId(String);

impl BufferId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BufferId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for BufferId {
    fn from(name: String) -> Self {
        Self(name)
    }
}
