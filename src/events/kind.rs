/*!
 * Event Kinds
 * Known buffer record kinds and the parse strategy each one needs
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a record's fields are laid out in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordShape {
    /// Flat `data` / `action` name-value fields
    Standard,
    /// A nested XML document carried inside one data field
    XmlPayload,
}

/// Event kind, dispatched on the record's declared name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SqlBatchCompleted,
    SqlBatchStarting,
    RpcCompleted,
    SqlStatementCompleted,
    SpStatementCompleted,
    Login,
    Logout,
    Attention,
    ErrorReported,
    SqlStatementRecompile,
    ObjectCreated,
    ObjectAltered,
    ObjectDeleted,
    XmlDeadlockReport,
    BlockedProcessReport,
    /// Any other record name, kept verbatim
    Other(String),
}

impl EventKind {
    /// Map a buffer record name onto a kind
    pub fn from_name(name: &str) -> Self {
        match name {
            "sql_batch_completed" => EventKind::SqlBatchCompleted,
            "sql_batch_starting" => EventKind::SqlBatchStarting,
            "rpc_completed" => EventKind::RpcCompleted,
            "sql_statement_completed" => EventKind::SqlStatementCompleted,
            "sp_statement_completed" => EventKind::SpStatementCompleted,
            "login" => EventKind::Login,
            "logout" => EventKind::Logout,
            "attention" => EventKind::Attention,
            "error_reported" => EventKind::ErrorReported,
            "sql_statement_recompile" => EventKind::SqlStatementRecompile,
            "object_created" => EventKind::ObjectCreated,
            "object_altered" => EventKind::ObjectAltered,
            "object_deleted" => EventKind::ObjectDeleted,
            "xml_deadlock_report" => EventKind::XmlDeadlockReport,
            "blocked_process_report" => EventKind::BlockedProcessReport,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// Buffer record name for this kind
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::SqlBatchCompleted => "sql_batch_completed",
            EventKind::SqlBatchStarting => "sql_batch_starting",
            EventKind::RpcCompleted => "rpc_completed",
            EventKind::SqlStatementCompleted => "sql_statement_completed",
            EventKind::SpStatementCompleted => "sp_statement_completed",
            EventKind::Login => "login",
            EventKind::Logout => "logout",
            EventKind::Attention => "attention",
            EventKind::ErrorReported => "error_reported",
            EventKind::SqlStatementRecompile => "sql_statement_recompile",
            EventKind::ObjectCreated => "object_created",
            EventKind::ObjectAltered => "object_altered",
            EventKind::ObjectDeleted => "object_deleted",
            EventKind::XmlDeadlockReport => "xml_deadlock_report",
            EventKind::BlockedProcessReport => "blocked_process_report",
            EventKind::Other(name) => name,
        }
    }

    /// Parse strategy for records of this kind
    #[inline]
    pub fn shape(&self) -> RecordShape {
        match self {
            EventKind::XmlDeadlockReport | EventKind::BlockedProcessReport => {
                RecordShape::XmlPayload
            }
            _ => RecordShape::Standard,
        }
    }

    /// Data field carrying the nested report document
    pub fn report_field(&self) -> Option<&'static str> {
        match self {
            EventKind::XmlDeadlockReport => Some("xml_report"),
            EventKind::BlockedProcessReport => Some("blocked_process"),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
