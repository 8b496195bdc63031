//! Error types for the index crate.

use verso_backend::{BackendError, CodecError};
use verso_commits::CommitError;
use verso_types::CommitId;

/// Errors that can occur during index operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    /// Commit store failure (including missing or corrupt commits).
    #[error(transparent)]
    Commit(#[from] CommitError),

    /// A snapshot is unreadable or inconsistent.
    #[error("corrupt snapshot at {anchor}: {reason}")]
    CorruptSnapshot { anchor: CommitId, reason: String },

    /// A walk exceeded its hard limit before finding a snapshot or the root.
    #[error("ancestry of {start} exceeds traversal limit {limit}")]
    TraversalLimit { start: CommitId, limit: usize },

    /// `ancestor` is not in the history of `descendant`.
    #[error("{ancestor} is not an ancestor of {descendant}")]
    NotAncestor {
        ancestor: CommitId,
        descendant: CommitId,
    },

    /// Encoding or decoding failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Error from the underlying backend.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl IndexError {
    /// Whether the failed call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_transient(),
            Self::Commit(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
