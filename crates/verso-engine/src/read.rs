//! Point-in-time reads.
//!
//! Every read names its point in history with a [`Target`]: either a
//! reference, resolved to its head once at the start of the read, or a
//! commit id. Reads never take locks; a reference that moves mid-read does
//! not affect a read that already resolved it.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::debug;
use verso_backend::keys::content_key;
use verso_commits::Commit;
use verso_crypto::ContentHasher;
use verso_index::{ContentIndex, DiffEntry};
use verso_refs::Reference;
use verso_types::{CommitId, ContentKey};

use crate::engine::VersionStore;
use crate::error::{EngineError, EngineResult};

/// A point in history to read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Reference(String),
    Commit(CommitId),
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Reference(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::Reference(name)
    }
}

impl From<CommitId> for Target {
    fn from(id: CommitId) -> Self {
        Self::Commit(id)
    }
}

impl From<&Reference> for Target {
    fn from(reference: &Reference) -> Self {
        Self::Commit(reference.commit)
    }
}

impl VersionStore {
    /// The commit `target` denotes right now.
    pub async fn resolve(&self, target: impl Into<Target>) -> EngineResult<CommitId> {
        match target.into() {
            Target::Commit(id) => Ok(id),
            Target::Reference(name) => Ok(self.refs.get_reference(&name).await?.commit),
        }
    }

    /// The full index at `target`.
    pub async fn materialize(&self, target: impl Into<Target>) -> EngineResult<ContentIndex> {
        let id = self.resolve(target).await?;
        Ok(self.index.materialize(&id).await?)
    }

    /// Every live key at `target`, in order.
    pub async fn get_keys(&self, target: impl Into<Target>) -> EngineResult<Vec<ContentKey>> {
        Ok(self.materialize(target).await?.keys().cloned().collect())
    }

    /// The values of `keys` at `target`. Keys without a value are absent
    /// from the result.
    pub async fn get_values(
        &self,
        target: impl Into<Target>,
        keys: &[ContentKey],
    ) -> EngineResult<BTreeMap<ContentKey, Bytes>> {
        let id = self.resolve(target).await?;
        let entries = self.index.lookup(&id, keys).await?;
        if entries.is_empty() {
            return Ok(BTreeMap::new());
        }

        let item_keys: Vec<String> = entries.values().map(|e| content_key(&e.pointer)).collect();
        let mut items = self.backend.batch_get_items(&item_keys).await?;

        let mut values = BTreeMap::new();
        for ((key, entry), item_key) in entries.into_iter().zip(item_keys.iter()) {
            let item = items.get(item_key).ok_or_else(|| {
                EngineError::Corruption(format!(
                    "value of {key} at {} is missing",
                    id.short_hex()
                ))
            })?;
            if !ContentHasher::CONTENT.verify(&item.value, &entry.pointer.object_id()) {
                return Err(EngineError::Corruption(format!(
                    "value of {key} does not match its pointer {}",
                    entry.pointer.short_hex()
                )));
            }
            values.insert(key, item.value.clone());
        }
        debug!(commit = %id.short_hex(), requested = keys.len(), found = values.len(), "read values");
        Ok(values)
    }

    /// Up to `limit` commits of history at `target`, newest first.
    pub async fn commit_log(
        &self,
        target: impl Into<Target>,
        limit: usize,
    ) -> EngineResult<Vec<Commit>> {
        let id = self.resolve(target).await?;
        let limit = limit.min(self.config.max_traversal);
        Ok(self.commits.ancestry(id, limit).collect().await?)
    }

    /// Per-key differences from `from` to `to`.
    pub async fn diff(
        &self,
        from: impl Into<Target>,
        to: impl Into<Target>,
    ) -> EngineResult<Vec<DiffEntry>> {
        let from = self.resolve(from).await?;
        let to = self.resolve(to).await?;
        Ok(self.index.diff(&from, &to).await?)
    }

    /// Whether `commit` is in the history of reference `name`'s head.
    pub async fn hash_on_reference(&self, name: &str, commit: &CommitId) -> EngineResult<bool> {
        let head = self.refs.get_reference(name).await?;
        if commit.is_no_ancestor() || head.commit == *commit {
            return Ok(true);
        }
        let target = self.commits.get_commit(commit).await?;
        self.descends_from(head.commit, &target).await
    }

    /// Whether `commit` is `head` or one of its ancestors. The walk stops
    /// once it passes `commit`'s depth.
    pub(crate) async fn descends_from(&self, head: CommitId, commit: &Commit) -> EngineResult<bool> {
        if head == commit.id {
            return Ok(true);
        }
        let mut walk = self.commits.ancestry(head, self.config.max_traversal);
        while let Some(c) = walk.next().await? {
            if c.id == commit.id {
                return Ok(true);
            }
            if c.depth() <= commit.depth() {
                return Ok(false);
            }
        }
        if walk.truncated() {
            return Err(EngineError::TraversalLimit {
                start: head,
                limit: self.config.max_traversal,
            });
        }
        Ok(false)
    }
}
