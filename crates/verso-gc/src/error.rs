//! Error types for garbage collection.

use verso_backend::BackendError;
use verso_commits::CommitError;
use verso_index::IndexError;
use verso_refs::RefError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GcError {
    /// Marking failed; nothing was reported or deleted.
    #[error("commit store: {0}")]
    Commit(#[from] CommitError),

    #[error("snapshots: {0}")]
    Index(#[from] IndexError),

    #[error("references: {0}")]
    Ref(#[from] RefError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GcError {
    /// Whether running the collection again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Commit(e) => e.is_transient(),
            Self::Index(e) => e.is_transient(),
            Self::Ref(e) => e.is_transient(),
            Self::Backend(e) => e.is_transient(),
            Self::Config(_) => false,
        }
    }
}

pub type GcResult<T> = Result<T, GcError>;
