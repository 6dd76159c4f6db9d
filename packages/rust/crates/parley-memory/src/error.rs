//! Error taxonomy for the memory tier.
//!
//! Library surfaces use `thiserror` enums; backend plumbing keeps `anyhow` context
//! inside `StoreError::Unavailable` messages.

use thiserror::Error;

/// Failure reported by a storage backend (window, durable log, summary store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or command failed; safe to retry.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its deadline; safe to retry.
    #[error("backend call timed out after {0} ms")]
    Timeout(u64),

    /// A different record already holds this sequence.
    #[error("sequence {sequence} already written for session {session_id}")]
    Conflict {
        /// Session the write targeted.
        session_id: String,
        /// Colliding sequence.
        sequence: u64,
    },

    /// Payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Whether a retry can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unavailable(format!("{error:#}"))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(error.to_string())
    }
}

/// Summarizer failure. Never fatal: the summary is left stale.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("summarization failed: {0}")]
pub struct SummarizationError(pub String);

impl SummarizationError {
    /// Build from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Public error returned by `MemoryCoordinator` operations.
///
/// Unknown sessions are not errors: reads return empty results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Session identifier was empty.
    #[error("session id must not be empty")]
    InvalidSession,

    /// Durable write or read could not be confirmed within the retry budget.
    #[error("{operation} failed for session {session_id} after {attempts} attempt(s): {message}")]
    Persistence {
        /// Backend operation name.
        operation: &'static str,
        /// Affected session.
        session_id: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last backend error.
        message: String,
    },

    /// Summarizer failed on a path that surfaces it.
    #[error(transparent)]
    Summarization(#[from] SummarizationError),

    /// Internal invariant breach (sequence collision, out-of-order window push).
    #[error("concurrency violation in session {session_id} at sequence {sequence}: {detail}")]
    ConcurrencyViolation {
        /// Affected session.
        session_id: String,
        /// Sequence involved.
        sequence: u64,
        /// What broke.
        detail: String,
    },

    /// Configuration rejected during validation.
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
