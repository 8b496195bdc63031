//! Error taxonomy surfaced by the engine.
//!
//! Lower crates report failures in their own terms; the conversions here
//! sort them into the categories callers act on: retry later
//! ([`EngineError::TransientBackend`]), re-read and decide
//! ([`EngineError::ReferenceConflict`], [`EngineError::KeyConflict`]), or
//! give up ([`EngineError::Corruption`] and the rest).

use verso_backend::{BackendError, CodecError};
use verso_commits::CommitError;
use verso_index::IndexError;
use verso_refs::{RefError, Reference};
use verso_types::{CommitId, ContentKey, TypeError};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The backend was unavailable, throttled, or timed out, and the retry
    /// budget is spent.
    #[error("transient backend failure: {0}")]
    TransientBackend(BackendError),

    /// The reference kept moving and the retry budget is spent, or the
    /// rebase policy refused to follow it.
    #[error("reference {reference} moved concurrently")]
    ReferenceConflict {
        reference: String,
        /// The reference as last read; `None` if it has been deleted.
        last_known: Option<Reference>,
    },

    /// Commits made since the caller's base touched keys this commit
    /// touches.
    #[error("reference {reference} has conflicting changes to {} key(s)", keys.len())]
    KeyConflict {
        reference: String,
        keys: Vec<ContentKey>,
    },

    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("reference already exists: {0}")]
    ReferenceExists(String),

    #[error("commit not found: {0}")]
    CommitNotFound(CommitId),

    /// Stored data failed verification. Never retried.
    #[error("corruption: {0}")]
    Corruption(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("history of {start} exceeds traversal limit {limit}")]
    TraversalLimit { start: CommitId, limit: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the operation may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBackend(_))
    }

    /// Whether the failure is a lost race rather than a fault.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ReferenceConflict { .. } | Self::KeyConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ReferenceNotFound(_) | Self::CommitNotFound(_))
    }

    /// The backend error behind a transient failure, if any.
    pub(crate) fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::TransientBackend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(e: BackendError) -> Self {
        if e.is_transient() {
            Self::TransientBackend(e)
        } else {
            Self::InvalidArgument(e.to_string())
        }
    }
}

impl From<CodecError> for EngineError {
    fn from(e: CodecError) -> Self {
        Self::Serialization(e.0)
    }
}

impl From<TypeError> for EngineError {
    fn from(e: TypeError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<CommitError> for EngineError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::NotFound(id) => Self::CommitNotFound(id),
            CommitError::Corruption { id, reason } => {
                Self::Corruption(format!("commit {id}: {reason}"))
            }
            CommitError::Invalid(msg) => Self::InvalidArgument(msg),
            CommitError::TraversalLimit { start, limit } => Self::TraversalLimit { start, limit },
            CommitError::Codec(e) => e.into(),
            CommitError::Backend(e) => e.into(),
        }
    }
}

impl From<IndexError> for EngineError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Commit(e) => e.into(),
            IndexError::CorruptSnapshot { anchor, reason } => {
                Self::Corruption(format!("snapshot at {anchor}: {reason}"))
            }
            IndexError::TraversalLimit { start, limit } => Self::TraversalLimit { start, limit },
            IndexError::NotAncestor {
                ancestor,
                descendant,
            } => Self::InvalidArgument(format!("{ancestor} is not an ancestor of {descendant}")),
            IndexError::Codec(e) => e.into(),
            IndexError::Backend(e) => e.into(),
        }
    }
}

impl From<RefError> for EngineError {
    fn from(e: RefError) -> Self {
        match e {
            RefError::NotFound { name } => Self::ReferenceNotFound(name),
            RefError::AlreadyExists { name } => Self::ReferenceExists(name),
            RefError::VersionConflict { name, .. } => Self::ReferenceConflict {
                reference: name,
                last_known: None,
            },
            RefError::InvalidName { name, reason } => {
                Self::InvalidArgument(format!("reference name {name:?}: {reason}"))
            }
            RefError::Corrupt { name, reason } => {
                Self::Corruption(format!("reference {name}: {reason}"))
            }
            RefError::Codec(e) => e.into(),
            RefError::Backend(e) => e.into(),
        }
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
