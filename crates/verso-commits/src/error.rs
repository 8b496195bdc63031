use verso_backend::{BackendError, CodecError};
use verso_types::CommitId;

/// Errors from commit store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommitError {
    /// The requested commit was not found.
    #[error("commit not found: {0}")]
    NotFound(CommitId),

    /// Stored bytes do not match the commit id (hash mismatch, or the same
    /// id stored with different content).
    #[error("corrupt commit {id}: {reason}")]
    Corruption { id: CommitId, reason: String },

    /// The commit payload is malformed.
    #[error("invalid commit: {0}")]
    Invalid(String),

    /// A traversal exceeded its hard limit.
    #[error("ancestry of {start} exceeds traversal limit {limit}")]
    TraversalLimit { start: CommitId, limit: usize },

    /// Encoding or decoding failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Error from the underlying backend.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl CommitError {
    /// Whether the failed call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_transient())
    }
}

/// Result alias for commit store operations.
pub type CommitResult<T> = Result<T, CommitError>;
