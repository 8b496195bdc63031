use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use verso_backend::keys::commit_key;
use verso_backend::{Backend, BackendError, Expected, Item, WriteOutcome};
use verso_types::CommitId;

use crate::ancestry::AncestryWalk;
use crate::commit::Commit;
use crate::error::{CommitError, CommitResult};

/// Attempts at a stamp-guarded write before giving up as transient.
const STAMP_ATTEMPTS: usize = 4;

/// Outcome of [`CommitStore::put_commit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The commit was newly stored.
    Written,
    /// An identical commit was already stored.
    AlreadyExists,
}

/// When a stored commit was last written or pinned, in Unix milliseconds.
///
/// Kept as the commit item's backend version. It only moves forward, so a
/// delete guarded on a stamp fails if anyone wrote or pinned the commit
/// after the stamp was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteStamp(u64);

impl WriteStamp {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_millis().max(1) as u64)
    }

    pub fn millis(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    fn version(&self) -> u64 {
        self.0
    }

    /// The stamp to write when moving on from `self` at `now`.
    fn advanced(&self, now: WriteStamp) -> WriteStamp {
        Self(now.0.max(self.0 + 1))
    }
}

/// Write-once commit storage over a [`Backend`].
///
/// Commits are never cached in process: another process may have written
/// or collected any commit since the last read, and the backend is the only
/// authority.
#[derive(Clone)]
pub struct CommitStore {
    backend: Arc<dyn Backend>,
}

impl CommitStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Store a commit, stamped with the current time.
    ///
    /// Idempotent: storing an identical commit again succeeds with
    /// [`PutOutcome::AlreadyExists`] and moves its stamp forward. Finding
    /// different bytes under the same id is reported as corruption and the
    /// stored item is left untouched.
    pub async fn put_commit(&self, commit: &Commit) -> CommitResult<PutOutcome> {
        self.put_commit_at(commit, Utc::now()).await
    }

    /// [`Self::put_commit`] with an explicit write time.
    pub async fn put_commit_at(
        &self,
        commit: &Commit,
        now: DateTime<Utc>,
    ) -> CommitResult<PutOutcome> {
        if commit.id.is_no_ancestor() {
            return Err(CommitError::Invalid(
                "the no-ancestor id cannot be stored".into(),
            ));
        }
        let key = commit_key(&commit.id);
        let bytes = Bytes::from(commit.to_bytes()?);
        let stamp = WriteStamp::at(now);

        for _ in 0..STAMP_ATTEMPTS {
            let outcome = self
                .backend
                .conditional_put_item(&key, Expected::Absent, Item::new(bytes.clone(), stamp.version()))
                .await?;
            if outcome == WriteOutcome::Applied {
                debug!(commit = %commit.id.short_hex(), depth = commit.depth(), "stored commit");
                return Ok(PutOutcome::Written);
            }

            // Deleted between our conditional put and the read; try again.
            let Some(existing) = self.backend.get_item(&key).await? else {
                continue;
            };
            if existing.value != bytes {
                warn!(commit = %commit.id, "commit id already stored with different content");
                return Err(CommitError::Corruption {
                    id: commit.id,
                    reason: "id already stored with different content".into(),
                });
            }
            if self.restamp(&key, &existing, stamp).await? {
                return Ok(PutOutcome::AlreadyExists);
            }
        }
        Err(contended(commit.id))
    }

    /// Move a stored commit's stamp to now, so a collection that saw it
    /// unreachable earlier can no longer delete it. Returns `false` if the
    /// commit does not exist.
    ///
    /// Callers pin a commit this way before pointing a reference at it.
    pub async fn touch(&self, id: &CommitId) -> CommitResult<bool> {
        self.touch_at(id, Utc::now()).await
    }

    /// [`Self::touch`] with an explicit time.
    pub async fn touch_at(&self, id: &CommitId, now: DateTime<Utc>) -> CommitResult<bool> {
        if id.is_no_ancestor() {
            return Ok(true);
        }
        let key = commit_key(id);
        let stamp = WriteStamp::at(now);
        for _ in 0..STAMP_ATTEMPTS {
            let Some(existing) = self.backend.get_item(&key).await? else {
                return Ok(false);
            };
            if self.restamp(&key, &existing, stamp).await? {
                return Ok(true);
            }
        }
        Err(contended(*id))
    }

    /// Rewrite `existing` with a stamp no older than `now`. Returns `false`
    /// if the item changed underneath.
    async fn restamp(&self, key: &str, existing: &Item, now: WriteStamp) -> CommitResult<bool> {
        let current = WriteStamp(existing.version);
        if current >= now {
            return Ok(true);
        }
        let outcome = self
            .backend
            .conditional_put_item(
                key,
                Expected::Version(existing.version),
                Item::new(existing.value.clone(), current.advanced(now).version()),
            )
            .await?;
        Ok(outcome == WriteOutcome::Applied)
    }

    /// Current stamps of the given commits. Missing commits are absent from
    /// the result.
    pub async fn write_stamps(&self, ids: &[CommitId]) -> CommitResult<HashMap<CommitId, WriteStamp>> {
        let wanted: Vec<CommitId> = ids.iter().filter(|id| !id.is_no_ancestor()).copied().collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = wanted.iter().map(commit_key).collect();
        let mut items = self.backend.batch_get_items(&keys).await?;
        Ok(wanted
            .iter()
            .zip(keys.iter())
            .filter_map(|(id, key)| items.remove(key).map(|item| (*id, WriteStamp(item.version))))
            .collect())
    }

    /// Read a commit, verifying its content hash.
    pub async fn get_commit(&self, id: &CommitId) -> CommitResult<Commit> {
        self.find_commit(id).await?.ok_or(CommitError::NotFound(*id))
    }

    /// Read a commit, returning `Ok(None)` if it does not exist.
    pub async fn find_commit(&self, id: &CommitId) -> CommitResult<Option<Commit>> {
        if id.is_no_ancestor() {
            return Ok(None);
        }
        match self.backend.get_item(&commit_key(id)).await? {
            Some(item) => Ok(Some(Commit::from_bytes(*id, &item.value)?)),
            None => Ok(None),
        }
    }

    /// Read many commits in one batch. Missing commits are absent from the
    /// result; corrupt ones fail the whole call.
    pub async fn get_commits(&self, ids: &[CommitId]) -> CommitResult<HashMap<CommitId, Commit>> {
        let wanted: Vec<CommitId> = ids.iter().filter(|id| !id.is_no_ancestor()).copied().collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = wanted.iter().map(commit_key).collect();
        let mut items = self.backend.batch_get_items(&keys).await?;

        let mut commits = HashMap::with_capacity(items.len());
        for (id, key) in wanted.iter().zip(keys.iter()) {
            if let Some(item) = items.remove(key) {
                commits.insert(*id, Commit::from_bytes(*id, &item.value)?);
            }
        }
        Ok(commits)
    }

    /// Whether a commit exists. The no-ancestor id always "exists".
    pub async fn contains(&self, id: &CommitId) -> CommitResult<bool> {
        if id.is_no_ancestor() {
            return Ok(true);
        }
        Ok(self.backend.get_item(&commit_key(id)).await?.is_some())
    }

    /// Delete a commit. Returns `true` if it existed.
    ///
    /// Only the garbage collector should call this; deleting a reachable
    /// commit breaks history.
    pub async fn delete_commit(&self, id: &CommitId) -> CommitResult<bool> {
        Ok(self.backend.delete_item(&commit_key(id)).await?)
    }

    /// Delete a commit only if its stamp is still `stamp`. Returns `false`
    /// if it was written, pinned, or deleted since the stamp was read.
    pub async fn delete_commit_if(&self, id: &CommitId, stamp: WriteStamp) -> CommitResult<bool> {
        let outcome = self
            .backend
            .conditional_delete_item(&commit_key(id), stamp.version())
            .await?;
        Ok(outcome == WriteOutcome::Applied)
    }

    /// Lazily walk history from `start` (inclusive) towards the root,
    /// yielding at most `limit` commits.
    pub fn ancestry(&self, start: CommitId, limit: usize) -> AncestryWalk {
        AncestryWalk::new(self.clone(), start, limit)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

fn contended(id: CommitId) -> CommitError {
    CommitError::Backend(BackendError::Unavailable(format!(
        "commit {id} kept changing while being stamped"
    )))
}

impl std::fmt::Debug for CommitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitStore").finish_non_exhaustive()
    }
}
