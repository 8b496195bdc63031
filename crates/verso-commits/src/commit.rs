use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use verso_backend::codec;
use verso_crypto::ContentHasher;
use verso_types::{CommitId, CommitMeta, ContentKey, ContentPointer};

use crate::error::{CommitError, CommitResult};

/// One change to the content index carried by a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Bind `key` to `content`.
    Put {
        key: ContentKey,
        content: ContentPointer,
    },
    /// Remove `key`.
    Delete { key: ContentKey },
    /// Leave `key` as is. Recorded so conflict detection sees the key.
    Unchanged { key: ContentKey },
}

impl Operation {
    pub fn key(&self) -> &ContentKey {
        match self {
            Self::Put { key, .. } | Self::Delete { key } | Self::Unchanged { key } => key,
        }
    }

    /// Whether applying this operation changes the index.
    pub fn modifies_index(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }
}

/// Where a new commit attaches to history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentLink {
    pub id: CommitId,
    /// The parent's own ancestors, parent first.
    pub ancestors: Vec<CommitId>,
    pub depth: u64,
}

impl ParentLink {
    /// The beginning of history.
    pub fn no_ancestor() -> Self {
        Self {
            id: CommitId::NO_ANCESTOR,
            ancestors: Vec::new(),
            depth: 0,
        }
    }

    /// Attach below an existing commit.
    pub fn of(commit: &Commit) -> Self {
        Self {
            id: commit.id,
            ancestors: commit.body.ancestors.clone(),
            depth: commit.body.depth,
        }
    }
}

/// The hashed part of a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBody {
    /// `None` for a commit built on the beginning of history.
    pub parent: Option<CommitId>,
    /// Parent first, then grandparent, and so on; bounded in length.
    pub ancestors: Vec<CommitId>,
    /// Parent hops to the beginning of history. The first commit has depth 1.
    pub depth: u64,
    pub meta: CommitMeta,
    pub operations: Vec<Operation>,
}

/// An immutable commit: its body plus the id derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub id: CommitId,
    pub body: CommitBody,
}

impl Commit {
    /// Build a commit attached to `parent`.
    ///
    /// `ancestors_per_commit` bounds the ancestor list recorded in the new
    /// commit. Fails if two operations name the same key.
    pub fn build(
        parent: &ParentLink,
        meta: CommitMeta,
        operations: Vec<Operation>,
        ancestors_per_commit: usize,
    ) -> CommitResult<Self> {
        let mut seen = BTreeSet::new();
        for op in &operations {
            if !seen.insert(op.key()) {
                return Err(CommitError::Invalid(format!(
                    "key {} appears in more than one operation",
                    op.key()
                )));
            }
        }

        let (parent_id, ancestors) = if parent.id.is_no_ancestor() {
            (None, Vec::new())
        } else {
            let mut ancestors = Vec::with_capacity(ancestors_per_commit.max(1));
            ancestors.push(parent.id);
            ancestors.extend(
                parent
                    .ancestors
                    .iter()
                    .copied()
                    .take(ancestors_per_commit.saturating_sub(1)),
            );
            (Some(parent.id), ancestors)
        };

        let body = CommitBody {
            parent: parent_id,
            ancestors,
            depth: parent.depth + 1,
            meta,
            operations,
        };
        let id = Self::compute_id(&body)?;
        Ok(Self { id, body })
    }

    /// Hash of the encoded body.
    pub fn compute_id(body: &CommitBody) -> CommitResult<CommitId> {
        let bytes = codec::encode(body)?;
        Ok(CommitId::new(ContentHasher::COMMIT.hash(&bytes)))
    }

    /// Encoded body, as stored.
    pub fn to_bytes(&self) -> CommitResult<Vec<u8>> {
        Ok(codec::encode(&self.body)?)
    }

    /// Decode a stored body, verifying that it hashes to `id`.
    pub fn from_bytes(id: CommitId, data: &[u8]) -> CommitResult<Self> {
        if !ContentHasher::COMMIT.verify(data, &id.object_id()) {
            return Err(CommitError::Corruption {
                id,
                reason: "stored bytes do not hash to the commit id".into(),
            });
        }
        let body: CommitBody = codec::decode(data).map_err(|e| CommitError::Corruption {
            id,
            reason: format!("undecodable body: {e}"),
        })?;
        Ok(Self { id, body })
    }

    /// The parent commit, or `None` at the beginning of history.
    pub fn parent(&self) -> Option<CommitId> {
        self.body.parent
    }

    /// The parent id, using the no-ancestor sentinel for root commits.
    pub fn parent_or_no_ancestor(&self) -> CommitId {
        self.body.parent.unwrap_or(CommitId::NO_ANCESTOR)
    }

    pub fn depth(&self) -> u64 {
        self.body.depth
    }

    pub fn meta(&self) -> &CommitMeta {
        &self.body.meta
    }

    pub fn operations(&self) -> &[Operation] {
        &self.body.operations
    }

    /// Keys whose index entry this commit changes.
    pub fn modified_keys(&self) -> impl Iterator<Item = &ContentKey> {
        self.body
            .operations
            .iter()
            .filter(|op| op.modifies_index())
            .map(Operation::key)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use verso_types::ObjectId;

    /// Metadata with a fixed timestamp so commit ids are reproducible.
    pub(crate) fn meta(message: &str) -> CommitMeta {
        CommitMeta {
            author: "tester".into(),
            message: message.into(),
            committed_at_ms: 1_700_000_000_000,
            properties: Default::default(),
        }
    }

    pub(crate) fn put(key: &str, value: &[u8]) -> Operation {
        Operation::Put {
            key: ContentKey::parse(key).unwrap(),
            content: ContentPointer::new(ObjectId::from_bytes(value)),
        }
    }

    #[test]
    fn root_commit_has_no_parent() {
        let c = Commit::build(&ParentLink::no_ancestor(), meta("root"), vec![], 4).unwrap();
        assert_eq!(c.parent(), None);
        assert_eq!(c.parent_or_no_ancestor(), CommitId::NO_ANCESTOR);
        assert!(c.body.ancestors.is_empty());
        assert_eq!(c.depth(), 1);
    }

    #[test]
    fn ancestors_are_bounded() {
        let mut link = ParentLink::no_ancestor();
        let mut last = None;
        for i in 0..6 {
            let c = Commit::build(&link, meta(&format!("c{i}")), vec![], 3).unwrap();
            link = ParentLink::of(&c);
            last = Some(c);
        }
        let last = last.unwrap();
        assert_eq!(last.depth(), 6);
        assert_eq!(last.body.ancestors.len(), 3);
        assert_eq!(last.body.ancestors[0], last.parent().unwrap());
    }

    #[test]
    fn id_is_content_derived() {
        let a = Commit::build(&ParentLink::no_ancestor(), meta("x"), vec![put("a", b"1")], 4)
            .unwrap();
        let b = Commit::build(&ParentLink::no_ancestor(), meta("x"), vec![put("a", b"1")], 4)
            .unwrap();
        let c = Commit::build(&ParentLink::no_ancestor(), meta("x"), vec![put("a", b"2")], 4)
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(!a.id.is_no_ancestor());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = Commit::build(
            &ParentLink::no_ancestor(),
            meta("dup"),
            vec![
                put("a", b"1"),
                Operation::Delete {
                    key: ContentKey::parse("a").unwrap(),
                },
            ],
            4,
        )
        .unwrap_err();
        assert!(matches!(err, CommitError::Invalid(_)));
    }

    #[test]
    fn bytes_verify_against_id() {
        let c = Commit::build(&ParentLink::no_ancestor(), meta("x"), vec![put("a", b"1")], 4)
            .unwrap();
        let bytes = c.to_bytes().unwrap();
        assert_eq!(Commit::from_bytes(c.id, &bytes).unwrap(), c);

        let mut tampered = bytes.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        assert!(matches!(
            Commit::from_bytes(c.id, &tampered),
            Err(CommitError::Corruption { .. })
        ));
    }

    #[test]
    fn modified_keys_skip_unchanged() {
        let c = Commit::build(
            &ParentLink::no_ancestor(),
            meta("x"),
            vec![
                put("a", b"1"),
                Operation::Unchanged {
                    key: ContentKey::parse("b").unwrap(),
                },
                Operation::Delete {
                    key: ContentKey::parse("c").unwrap(),
                },
            ],
            4,
        )
        .unwrap();
        let keys: Vec<String> = c.modified_keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }
}
