//! # agentmem
//!
//! Per-agent memory engine for a multi-agent assistant runtime.
//!
//! Each agent (identified by a stable textual id) owns:
//!
//! - an append-only event journal, partitioned by UTC day
//!   (`<root>/<agent>/memory/events/<YYYY-MM-DD>.jsonl`);
//! - a `SQLite` item store with an FTS5 index and an optional embedding index
//!   (`<root>/<agent>/memory/memory.db`);
//! - checkpoint records and maintenance reports written as JSON artifacts.
//!
//! Events flow from the [`journal::Journal`] through the
//! [`services::CheckpointService`], which distills them into durable
//! [`models::MemoryItem`]s via the [`distill::Distiller`]. Recall goes through
//! [`services::RecallService`]; the [`services::MaintenanceService`] archives
//! duplicates and stale items. The [`facade::MemoryFacade`] is the single
//! entry point tool handlers bind to.
//!
//! ## Example
//!
//! ```rust,ignore
//! use agentmem::{CancelToken, MemoryConfig, MemoryFacade};
//! use agentmem::facade::WriteArgs;
//!
//! let facade = MemoryFacade::open(MemoryConfig::default(), "planner")?;
//! let item = facade.write(
//!     WriteArgs::new("preference", "Tone", "be concise and proactive"),
//!     &CancelToken::new(),
//! )?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use serde_json::json;
use thiserror::Error as ThisError;

// Module declarations
pub mod cancel;
pub mod config;
pub mod distill;
pub mod embedding;
pub mod facade;
pub mod journal;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use config::MemoryConfig;
pub use embedding::Embedder;
pub use facade::MemoryFacade;
pub use journal::Journal;
pub use llm::LlmProvider;
pub use models::{
    CheckpointRecord, Event, EventType, Health, ItemStatus, MaintenanceReport, MemoryItem,
    SearchMode, SearchParams,
};
pub use services::{CheckpointService, MaintenanceService, RecallService};
pub use storage::ItemStore;

/// Error type for agentmem operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Argument shape violations, bad agent ids, missing policy handle |
/// | `NotFound` | Item id unknown to the agent |
/// | `QueueFull` | Journal buffer full; the drop counter was advanced |
/// | `Closed` | Operation on a closed journal handle |
/// | `PolicyDenied` | Cross-agent write or a denied capability |
/// | `Transport` | Model/embedder call failed, non-2xx, or oversized body |
/// | `Parse` | Distillation output did not conform to the schema |
/// | `OperationFailed` | `SQLite` or filesystem failure |
/// | `Cancelled` | The caller's [`CancelToken`] fired or its deadline passed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested item does not exist for this agent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The journal buffer is full and the event was dropped.
    #[error("journal queue full")]
    QueueFull,

    /// The handle has been closed.
    #[error("closed: {0}")]
    Closed(String),

    /// The operation is not permitted.
    ///
    /// Raised when:
    /// - An item carries an `agent_id` other than the store's agent
    /// - The caller's policy gate refuses the tool
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// A remote model or embedder call failed.
    #[error("transport '{operation}' failed: {cause}")]
    Transport {
        /// The remote operation.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Model output could not be parsed or validated.
    #[error("parse failure: {0}")]
    Parse(String),

    /// A storage operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail
    /// - Filesystem I/O on journals or artifacts fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The operation was cancelled by its caller.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Stable, machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Argument or policy-required field violations.
    InvalidInput,
    /// Unknown item id.
    NotFound,
    /// Journal backpressure drop.
    QueueFull,
    /// Closed handle.
    Closed,
    /// Cross-agent write or missing capability.
    PolicyDenied,
    /// Remote call failure.
    TransportFailure,
    /// Schema non-conformance.
    ParseFailure,
    /// Persistence failure.
    StorageFailure,
    /// Cancellation from the caller.
    Timeout,
}

impl ErrorKind {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
            Self::PolicyDenied => "policy_denied",
            Self::TransportFailure => "transport_failure",
            Self::ParseFailure => "parse_failure",
            Self::StorageFailure => "storage_failure",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Returns the stable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::QueueFull => ErrorKind::QueueFull,
            Self::Closed(_) => ErrorKind::Closed,
            Self::PolicyDenied(_) => ErrorKind::PolicyDenied,
            Self::Transport { .. } => ErrorKind::TransportFailure,
            Self::Parse(_) => ErrorKind::ParseFailure,
            Self::OperationFailed { .. } => ErrorKind::StorageFailure,
            Self::Cancelled(_) => ErrorKind::Timeout,
        }
    }

    /// Renders the error as the structured payload returned to tool callers.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "error": {
                "kind": self.kind().as_str(),
                "message": self.to_string(),
            }
        })
    }

    /// Shorthand for an [`Error::OperationFailed`] built from any displayable cause.
    pub(crate) fn storage(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for agentmem operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        assert_eq!(Error::QueueFull.to_string(), "journal queue full");
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(Error::QueueFull.kind().as_str(), "queue_full");
        assert_eq!(
            Error::PolicyDenied("x".into()).kind(),
            ErrorKind::PolicyDenied
        );
        assert_eq!(Error::Cancelled("x".into()).kind().as_str(), "timeout");
        assert_eq!(
            Error::storage("open", "disk full").kind().as_str(),
            "storage_failure"
        );
    }

    #[test]
    fn test_payload_shape() {
        let payload = Error::NotFound("item abc".into()).to_payload();
        assert_eq!(payload["error"]["kind"], "not_found");
        assert_eq!(payload["error"]["message"], "not found: item abc");
    }
}
