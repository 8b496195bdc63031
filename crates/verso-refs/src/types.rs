//! Core reference types.

use serde::{Deserialize, Serialize};
use verso_types::CommitId;

/// What a reference is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    /// Advanced by commits.
    Branch,
    /// Names a fixed commit; never the target of a commit.
    Tag,
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch => f.write_str("branch"),
            Self::Tag => f.write_str("tag"),
        }
    }
}

/// A reference as read from the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub kind: RefKind,
    /// The commit this reference points at. The no-ancestor id for a branch
    /// with no commits yet.
    pub commit: CommitId,
    /// Bumped by one on every successful update; the compare-and-swap token.
    pub version: u64,
}

impl Reference {
    pub fn is_branch(&self) -> bool {
        self.kind == RefKind::Branch
    }

    pub fn is_tag(&self) -> bool {
        self.kind == RefKind::Tag
    }

    /// Whether the reference points at the beginning of history.
    pub fn is_empty(&self) -> bool {
        self.commit.is_no_ancestor()
    }
}

/// The stored payload. The version lives on the backend item.
///
/// Deleting a reference leaves a `Deleted` record so its version keeps
/// counting up if the name is created again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum RefRecord {
    Live { kind: RefKind, commit: CommitId },
    Deleted,
}
