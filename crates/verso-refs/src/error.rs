//! Error types for reference operations.

use thiserror::Error;
use verso_backend::{BackendError, CodecError};

/// Errors that can occur during reference operations.
#[derive(Debug, Clone, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// A reference with this name already exists.
    #[error("ref already exists: {name}")]
    AlreadyExists { name: String },

    /// The stored version differs from the one the caller expected.
    /// `actual` is `None` when the reference has since been deleted.
    #[error("ref {name} is at version {actual:?}, expected {expected}")]
    VersionConflict {
        name: String,
        expected: u64,
        actual: Option<u64>,
    },

    /// The reference name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// A stored reference record could not be decoded.
    #[error("corrupt ref {name}: {reason}")]
    Corrupt { name: String, reason: String },

    /// Serialization failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Error from the underlying backend.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl RefError {
    /// Whether the failed call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_transient())
    }
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
