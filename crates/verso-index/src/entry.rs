//! Index value types.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use verso_commits::{Commit, Operation};
use verso_types::{CommitId, ContentKey, ContentPointer};

/// The live binding of one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub pointer: ContentPointer,
    /// The commit whose `Put` produced this binding.
    pub introduced_at: CommitId,
}

/// Changes one commit makes to the index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexDelta {
    pub added: BTreeMap<ContentKey, ContentPointer>,
    pub removed: BTreeSet<ContentKey>,
}

impl IndexDelta {
    /// Derive the delta from a commit's operations.
    pub fn of(commit: &Commit) -> Self {
        let mut delta = Self::default();
        for op in commit.operations() {
            match op {
                Operation::Put { key, content } => {
                    delta.added.insert(key.clone(), *content);
                }
                Operation::Delete { key } => {
                    delta.removed.insert(key.clone());
                }
                Operation::Unchanged { .. } => {}
            }
        }
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Keys this delta touches.
    pub fn keys(&self) -> impl Iterator<Item = &ContentKey> {
        self.added.keys().chain(self.removed.iter())
    }
}

/// The full key → content mapping as of one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentIndex {
    entries: BTreeMap<ContentKey, IndexEntry>,
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<ContentKey, IndexEntry>) -> Self {
        Self { entries }
    }

    /// Apply a commit's delta on top of this index.
    pub fn apply(&mut self, commit: CommitId, delta: &IndexDelta) {
        for key in &delta.removed {
            self.entries.remove(key);
        }
        for (key, pointer) in &delta.added {
            self.entries.insert(
                key.clone(),
                IndexEntry {
                    pointer: *pointer,
                    introduced_at: commit,
                },
            );
        }
    }

    pub fn get(&self, key: &ContentKey) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ContentKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ContentKey, IndexEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ContentKey> {
        self.entries.keys()
    }

    pub fn into_entries(self) -> BTreeMap<ContentKey, IndexEntry> {
        self.entries
    }

    /// Per-key differences from `self` to `other`, in key order.
    pub fn diff(&self, other: &ContentIndex) -> Vec<DiffEntry> {
        let keys: BTreeSet<&ContentKey> = self.keys().chain(other.keys()).collect();
        keys.into_iter()
            .filter_map(|key| {
                let from = self.get(key).map(|e| e.pointer);
                let to = other.get(key).map(|e| e.pointer);
                (from != to).then(|| DiffEntry {
                    key: key.clone(),
                    from,
                    to,
                })
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ContentIndex {
    type Item = (&'a ContentKey, &'a IndexEntry);
    type IntoIter = btree_map::Iter<'a, ContentKey, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// One key that differs between two indexes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    pub key: ContentKey,
    /// `None` if the key is absent on the `from` side.
    pub from: Option<ContentPointer>,
    /// `None` if the key is absent on the `to` side.
    pub to: Option<ContentPointer>,
}
