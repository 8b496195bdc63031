//! Commit requests and their outcomes.

use std::collections::BTreeSet;

use bytes::Bytes;
use verso_refs::Reference;
use verso_types::{CommitId, CommitMeta, ContentKey};

use crate::policy::RebasePolicy;

/// One change requested by a caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// Store `value` under `key`.
    Put { key: ContentKey, value: Bytes },
    Delete { key: ContentKey },
    /// Record `key` as read so concurrent changes to it conflict.
    Unchanged { key: ContentKey },
}

impl Change {
    pub fn key(&self) -> &ContentKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key } | Self::Unchanged { key } => key,
        }
    }
}

/// A request to commit changes to a branch.
#[derive(Clone, Debug)]
pub struct CommitRequest {
    pub reference: String,
    pub meta: CommitMeta,
    pub changes: Vec<Change>,
    /// The head the caller based its changes on. When absent, the head read
    /// on the first attempt is the base.
    pub expected_head: Option<CommitId>,
    /// Overrides the engine's default policy.
    pub policy: Option<RebasePolicy>,
}

impl CommitRequest {
    pub fn new(reference: impl Into<String>, meta: CommitMeta) -> Self {
        Self {
            reference: reference.into(),
            meta,
            changes: Vec::new(),
            expected_head: None,
            policy: None,
        }
    }

    pub fn put(mut self, key: ContentKey, value: impl Into<Bytes>) -> Self {
        self.changes.push(Change::Put {
            key,
            value: value.into(),
        });
        self
    }

    pub fn delete(mut self, key: ContentKey) -> Self {
        self.changes.push(Change::Delete { key });
        self
    }

    pub fn unchanged(mut self, key: ContentKey) -> Self {
        self.changes.push(Change::Unchanged { key });
        self
    }

    pub fn expecting(mut self, head: CommitId) -> Self {
        self.expected_head = Some(head);
        self
    }

    pub fn with_policy(mut self, policy: RebasePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Every key the request names.
    pub fn keys(&self) -> BTreeSet<ContentKey> {
        self.changes.iter().map(|c| c.key().clone()).collect()
    }
}

/// Whether the snapshot step ran and how it went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotStatus {
    NotNeeded,
    Written,
    /// Left for a later commit to retry.
    Failed,
}

/// A successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    pub commit: CommitId,
    /// The branch as last read after the advance. Normally it points at
    /// `commit`; after an unacknowledged update it may already point at a
    /// later commit built on top of it.
    pub reference: Reference,
    /// Attempts made, counting the first.
    pub attempts: u32,
    /// Whether the commit was rebuilt on a head other than its base.
    pub rebased: bool,
    pub snapshot: SnapshotStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_changes() {
        let k = |s: &str| ContentKey::parse(s).unwrap();
        let req = CommitRequest::new("main", CommitMeta::new("alice", "edit"))
            .put(k("a"), &b"1"[..])
            .delete(k("b"))
            .unchanged(k("c"))
            .with_policy(RebasePolicy::AlwaysRebase);
        assert_eq!(req.changes.len(), 3);
        assert_eq!(req.keys().len(), 3);
        assert_eq!(req.policy, Some(RebasePolicy::AlwaysRebase));
        assert!(req.expected_head.is_none());
        assert_eq!(req.changes[0].key(), &k("a"));
    }
}
