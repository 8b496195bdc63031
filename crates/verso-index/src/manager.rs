//! Point-in-time index reconstruction and snapshot policy.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use verso_commits::{Commit, CommitStore};
use verso_types::{CommitId, ContentKey};

use crate::entry::{ContentIndex, DiffEntry, IndexDelta, IndexEntry};
use crate::error::{IndexError, IndexResult};
use crate::snapshot::{SnapshotHeader, SnapshotStore};

/// Tunables for the index manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum parent hops between any commit and its nearest snapshot.
    /// Zero disables snapshots.
    pub snapshot_interval: u64,
    /// Maximum entries per snapshot segment.
    pub segment_size: usize,
    /// Hard limit on commits visited by a single walk.
    pub max_traversal: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 20,
            segment_size: 512,
            max_traversal: 10_000,
        }
    }
}

/// Where the nearest snapshot of a commit sits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotLocation {
    /// Commits whose deltas lie between the snapshot and the commit, the
    /// commit itself included. Equals the commit's depth when there is no
    /// snapshot at all.
    pub distance: u64,
    pub anchor: Option<SnapshotHeader>,
}

/// Commits and keys between two points of one history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Intervening {
    /// Newest first.
    pub commits: Vec<CommitId>,
    /// Every key named by an operation of those commits.
    pub keys: BTreeSet<ContentKey>,
}

/// Reconstructs content indexes from commit deltas and snapshots.
#[derive(Clone, Debug)]
pub struct IndexManager {
    commits: CommitStore,
    snapshots: SnapshotStore,
    config: IndexConfig,
}

/// Result of walking back from a commit towards its nearest snapshot.
struct Located {
    /// Newest first; excludes the snapshot anchor.
    path: Vec<Commit>,
    anchor: Option<SnapshotHeader>,
    truncated: bool,
}

/// Snapshot header lookups, batched along a commit's ancestor window.
#[derive(Default)]
struct HeaderWindow {
    checked: HashSet<CommitId>,
    found: HashMap<CommitId, SnapshotHeader>,
}

impl HeaderWindow {
    async fn at(
        &mut self,
        snapshots: &SnapshotStore,
        commit: &Commit,
    ) -> IndexResult<Option<SnapshotHeader>> {
        if !self.checked.contains(&commit.id) {
            let window: Vec<CommitId> = std::iter::once(commit.id)
                .chain(commit.body.ancestors.iter().copied())
                .filter(|id| !self.checked.contains(id))
                .collect();
            self.found.extend(snapshots.headers(&window).await?);
            self.checked.extend(window);
        }
        Ok(self.found.remove(&commit.id))
    }
}

impl IndexManager {
    pub fn new(commits: CommitStore, snapshots: SnapshotStore, config: IndexConfig) -> Self {
        Self {
            commits,
            snapshots,
            config,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn commits(&self) -> &CommitStore {
        &self.commits
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// The index changes `commit` makes.
    pub fn delta_for_commit(&self, commit: &Commit) -> IndexDelta {
        IndexDelta::of(commit)
    }

    /// The full index as of `id`.
    pub async fn materialize(&self, id: &CommitId) -> IndexResult<ContentIndex> {
        let located = self.locate(*id, self.config.max_traversal).await?;
        if located.truncated {
            return Err(IndexError::TraversalLimit {
                start: *id,
                limit: self.config.max_traversal,
            });
        }

        let mut index = match &located.anchor {
            Some(header) => self.snapshots.load(header).await?,
            None => ContentIndex::new(),
        };
        for commit in located.path.iter().rev() {
            index.apply(commit.id, &IndexDelta::of(commit));
        }
        debug!(
            commit = %id.short_hex(),
            replayed = located.path.len(),
            from_snapshot = located.anchor.is_some(),
            entries = index.len(),
            "materialized index"
        );
        Ok(index)
    }

    /// Distance from `id` back to its nearest snapshot.
    pub async fn nearest_snapshot(&self, id: &CommitId) -> IndexResult<SnapshotLocation> {
        let located = self.locate(*id, self.config.max_traversal).await?;
        if located.truncated {
            return Err(IndexError::TraversalLimit {
                start: *id,
                limit: self.config.max_traversal,
            });
        }
        Ok(SnapshotLocation {
            distance: located.path.len() as u64,
            anchor: located.anchor,
        })
    }

    /// Whether `id` is far enough from its nearest snapshot to need one.
    ///
    /// Only walks `snapshot_interval` commits, so the cost is bounded even
    /// when earlier snapshot writes failed.
    pub async fn should_snapshot(&self, id: &CommitId) -> IndexResult<bool> {
        let interval = self.config.snapshot_interval;
        if interval == 0 || id.is_no_ancestor() {
            return Ok(false);
        }
        let cap = usize::try_from(interval).unwrap_or(usize::MAX);
        let located = self.locate(*id, cap).await?;
        if located.anchor.is_some() {
            return Ok(located.path.len() as u64 >= interval);
        }
        Ok(located.truncated || located.path.len() as u64 >= interval)
    }

    /// Materialize `id` and persist it as a snapshot.
    pub async fn write_snapshot(&self, id: &CommitId) -> IndexResult<SnapshotHeader> {
        let commit = self.commits.get_commit(id).await?;
        let index = self.materialize(id).await?;
        self.snapshots
            .write(*id, commit.depth(), &index, self.config.segment_size)
            .await
    }

    /// Resolve only `keys` as of `id`.
    ///
    /// Walks deltas newest to oldest and stops as soon as every key is
    /// settled, consulting a snapshot only for keys still open when one is
    /// reached. Absent keys are missing from the result.
    pub async fn lookup(
        &self,
        id: &CommitId,
        keys: &[ContentKey],
    ) -> IndexResult<BTreeMap<ContentKey, IndexEntry>> {
        let mut open: BTreeSet<ContentKey> = keys.iter().cloned().collect();
        let mut resolved = BTreeMap::new();
        let mut headers = HeaderWindow::default();
        let mut walk = self.commits.ancestry(*id, self.config.max_traversal);

        while !open.is_empty() {
            let Some(commit) = walk.next().await? else {
                if walk.truncated() {
                    return Err(IndexError::TraversalLimit {
                        start: *id,
                        limit: self.config.max_traversal,
                    });
                }
                break;
            };

            if let Some(header) = headers.at(&self.snapshots, &commit).await? {
                let wanted: Vec<ContentKey> = open.iter().cloned().collect();
                for (key, entry) in self.snapshots.lookup(&header, &wanted).await? {
                    if let Some(entry) = entry {
                        resolved.insert(key, entry);
                    }
                }
                open.clear();
                break;
            }

            let delta = IndexDelta::of(&commit);
            for (key, pointer) in &delta.added {
                if open.remove(key) {
                    resolved.insert(
                        key.clone(),
                        IndexEntry {
                            pointer: *pointer,
                            introduced_at: commit.id,
                        },
                    );
                }
            }
            for key in &delta.removed {
                open.remove(key);
            }
        }
        Ok(resolved)
    }

    /// Commits after `from_exclusive` up to and including `to_inclusive`,
    /// and the keys they name.
    ///
    /// `from_exclusive` may be the no-ancestor id, meaning the whole history
    /// of `to_inclusive`. Fails with [`IndexError::NotAncestor`] if
    /// `from_exclusive` is not in that history.
    pub async fn keys_touched(
        &self,
        from_exclusive: &CommitId,
        to_inclusive: &CommitId,
    ) -> IndexResult<Intervening> {
        let mut intervening = Intervening::default();
        if from_exclusive == to_inclusive {
            return Ok(intervening);
        }

        let mut walk = self.commits.ancestry(*to_inclusive, self.config.max_traversal);
        while let Some(commit) = walk.next().await? {
            if commit.id == *from_exclusive {
                return Ok(intervening);
            }
            intervening.commits.push(commit.id);
            intervening
                .keys
                .extend(commit.operations().iter().map(|op| op.key().clone()));
        }

        if walk.truncated() {
            return Err(IndexError::TraversalLimit {
                start: *to_inclusive,
                limit: self.config.max_traversal,
            });
        }
        if from_exclusive.is_no_ancestor() {
            return Ok(intervening);
        }
        Err(IndexError::NotAncestor {
            ancestor: *from_exclusive,
            descendant: *to_inclusive,
        })
    }

    /// Per-key differences between the indexes at `from` and `to`.
    pub async fn diff(&self, from: &CommitId, to: &CommitId) -> IndexResult<Vec<DiffEntry>> {
        let from_index = self.materialize(from).await?;
        let to_index = self.materialize(to).await?;
        Ok(from_index.diff(&to_index))
    }

    async fn locate(&self, id: CommitId, limit: usize) -> IndexResult<Located> {
        let mut path = Vec::new();
        let mut headers = HeaderWindow::default();
        let mut walk = self.commits.ancestry(id, limit);

        while let Some(commit) = walk.next().await? {
            if let Some(header) = headers.at(&self.snapshots, &commit).await? {
                return Ok(Located {
                    path,
                    anchor: Some(header),
                    truncated: false,
                });
            }
            path.push(commit);
        }
        Ok(Located {
            path,
            anchor: None,
            truncated: walk.truncated(),
        })
    }
}
