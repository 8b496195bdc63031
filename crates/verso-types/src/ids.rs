//! Typed identifiers layered over [`ObjectId`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::ObjectId;

/// Identifier of a commit: the domain-separated hash of its content.
///
/// The all-zero id is the no-ancestor sentinel. It marks the beginning of
/// history (an empty content index) and is never stored as a commit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId(ObjectId);

impl CommitId {
    /// The beginning of history.
    pub const NO_ANCESTOR: CommitId = CommitId(ObjectId::null());

    pub const fn new(id: ObjectId) -> Self {
        Self(id)
    }

    /// Returns `true` for the no-ancestor sentinel.
    pub fn is_no_ancestor(&self) -> bool {
        self.0.is_null()
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn short_hex(&self) -> String {
        self.0.short_hex()
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        ObjectId::from_hex(s).map(Self)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_no_ancestor() {
            write!(f, "CommitId(no-ancestor)")
        } else {
            write!(f, "CommitId({})", self.short_hex())
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ObjectId> for CommitId {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

/// Pointer to a content value stored under its own hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentPointer(ObjectId);

impl ContentPointer {
    pub const fn new(id: ObjectId) -> Self {
        Self(id)
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn short_hex(&self) -> String {
        self.0.short_hex()
    }
}

impl fmt::Debug for ContentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentPointer({})", self.short_hex())
    }
}

impl fmt::Display for ContentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
