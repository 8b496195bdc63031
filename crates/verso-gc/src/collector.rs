use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};
use verso_backend::keys::{commit_id_from_key, COMMIT_PREFIX, SNAPSHOT_PREFIX};
use verso_backend::Backend;
use verso_commits::CommitStore;
use verso_index::SnapshotStore;
use verso_refs::ReferenceStore;
use verso_types::{CommitId, ObjectId};

use crate::config::{GcConfig, GcParams};
use crate::error::GcResult;

/// What a sweep removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub commits_deleted: u64,
    /// Candidates left in place because they became reachable, or were
    /// written or pinned, after they were reported.
    pub commits_kept: u64,
    pub snapshots_deleted: u64,
    pub segments_deleted: u64,
}

/// Finds and removes commits no live reference can reach.
///
/// Collection runs concurrently with writers. Age is judged by each
/// commit's write stamp, which the store sets when the commit is written
/// and moves forward whenever a reference update pins it. A sweep marks
/// again from the live heads and deletes each commit only while its stamp
/// is unchanged, so a commit referenced after it was reported survives.
#[derive(Clone)]
pub struct GarbageCollector {
    backend: Arc<dyn Backend>,
    commits: CommitStore,
    snapshots: SnapshotStore,
    refs: ReferenceStore,
    config: GcConfig,
}

impl GarbageCollector {
    pub fn new(backend: Arc<dyn Backend>, config: GcConfig) -> Self {
        Self {
            commits: CommitStore::new(backend.clone()),
            snapshots: SnapshotStore::new(backend.clone()),
            refs: ReferenceStore::new(backend.clone()),
            backend,
            config,
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Commits not reachable from the heads of `live_refs`, or of every
    /// reference when `live_refs` is `None`, and not written or pinned
    /// within the grace period.
    ///
    /// Marking happens before this returns; candidates are then streamed
    /// page by page as the result is consumed.
    pub async fn find_unreachable(
        &self,
        live_refs: Option<&[String]>,
        params: GcParams,
    ) -> GcResult<UnreachableCommits> {
        let heads = self.live_heads(live_refs).await?;
        let reachable = self.mark(&heads).await?;
        info!(
            heads = heads.len(),
            reachable = reachable.len(),
            cutoff_ms = params.cutoff_ms(),
            "marked reachable commits"
        );
        Ok(UnreachableCommits {
            gc: self.clone(),
            reachable,
            cutoff_ms: params.cutoff_ms(),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
            scanned: 0,
        })
    }

    /// Delete those of `ids` that are still collectable, along with the
    /// snapshots anchored at them and any segments no remaining snapshot
    /// uses.
    ///
    /// `live_refs` and `params` should match the
    /// [`GarbageCollector::find_unreachable`] call that reported `ids`.
    /// Reachability is marked again first. Each commit is then deleted only
    /// if its write stamp is outside the grace period and has not moved
    /// since this call read it.
    pub async fn sweep(
        &self,
        ids: &[CommitId],
        live_refs: Option<&[String]>,
        params: GcParams,
    ) -> GcResult<GcReport> {
        let mut report = GcReport::default();
        let mut orphaned: BTreeSet<ObjectId> = BTreeSet::new();

        // Stamps first: a pin that lands after this read fails the delete,
        // and a reference update that finished before it shows in the marks.
        let stamps = self.commits.write_stamps(ids).await?;
        let reachable = self.mark(&self.live_heads(live_refs).await?).await?;
        let cutoff_ms = params.cutoff_ms();

        for id in ids {
            match stamps.get(id) {
                // Already gone; only a leftover snapshot may remain.
                None => {}
                Some(_) if reachable.contains(id) => {
                    debug!(commit = %id.short_hex(), "reachable again, keeping");
                    report.commits_kept += 1;
                    continue;
                }
                Some(stamp) if stamp.millis() > cutoff_ms => {
                    debug!(commit = %id.short_hex(), "written within grace period, keeping");
                    report.commits_kept += 1;
                    continue;
                }
                Some(stamp) => {
                    if !self.commits.delete_commit_if(id, *stamp).await? {
                        debug!(commit = %id.short_hex(), "changed since stamped, keeping");
                        report.commits_kept += 1;
                        continue;
                    }
                    report.commits_deleted += 1;
                }
            }
            if let Some(header) = self.snapshots.header(id).await? {
                if self.snapshots.delete_header(id).await? {
                    report.snapshots_deleted += 1;
                }
                orphaned.extend(header.segments.iter().map(|s| s.id));
            }
        }

        if !orphaned.is_empty() {
            report.segments_deleted = self.collect_segments(orphaned).await?;
        }

        info!(
            commits = report.commits_deleted,
            kept = report.commits_kept,
            snapshots = report.snapshots_deleted,
            segments = report.segments_deleted,
            "sweep finished"
        );
        Ok(report)
    }

    /// Delete the `candidates` no snapshot uses. A snapshot written while
    /// this runs may start using one after it is deleted, so usage is
    /// checked again afterwards and such segments are put back.
    async fn collect_segments(&self, mut candidates: BTreeSet<ObjectId>) -> GcResult<u64> {
        for id in self.segments_in_use().await? {
            candidates.remove(&id);
        }
        let mut removed = Vec::new();
        for id in candidates {
            if let Some(bytes) = self.snapshots.delete_segment(&id).await? {
                removed.push((id, bytes));
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        let in_use = self.segments_in_use().await?;
        let mut deleted = 0;
        for (id, bytes) in removed {
            if in_use.contains(&id) {
                warn!(segment = %id.short_hex(), "segment picked up by a new snapshot, restoring");
                self.snapshots.restore_segment(&id, bytes).await?;
            } else {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn live_heads(&self, live_refs: Option<&[String]>) -> GcResult<Vec<CommitId>> {
        let heads = match live_refs {
            Some(names) => {
                let mut heads = Vec::with_capacity(names.len());
                for name in names {
                    heads.push(self.refs.get_reference(name).await?.commit);
                }
                heads
            }
            None => self
                .refs
                .list_references()
                .await?
                .into_iter()
                .map(|r| r.commit)
                .collect(),
        };
        Ok(heads.into_iter().filter(|h| !h.is_no_ancestor()).collect())
    }

    /// Every commit reachable from `heads`. A missing ancestor aborts the
    /// run, since guessing would risk deleting live history.
    async fn mark(&self, heads: &[CommitId]) -> GcResult<HashSet<CommitId>> {
        let mut reachable = HashSet::new();
        for head in heads {
            if reachable.contains(head) {
                continue;
            }
            let mut walk = self.commits.ancestry(*head, usize::MAX);
            while let Some(commit) = walk.next().await? {
                if !reachable.insert(commit.id) {
                    break;
                }
            }
        }
        Ok(reachable)
    }

    async fn segments_in_use(&self) -> GcResult<HashSet<ObjectId>> {
        let mut in_use = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .backend
                .scan_keys(SNAPSHOT_PREFIX, cursor.as_deref(), self.config.scan_page_size)
                .await?;
            let anchors: Vec<CommitId> = page
                .keys
                .iter()
                .filter_map(|k| k.strip_prefix(SNAPSHOT_PREFIX))
                .filter_map(|hex| CommitId::from_hex(hex).ok())
                .collect();
            for header in self.snapshots.headers(&anchors).await?.into_values() {
                in_use.extend(header.segments.iter().map(|s| s.id));
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(in_use),
            }
        }
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Lazy sequence of unreachable commit ids.
pub struct UnreachableCommits {
    gc: GarbageCollector,
    reachable: HashSet<CommitId>,
    cutoff_ms: i64,
    cursor: Option<String>,
    buffer: VecDeque<CommitId>,
    exhausted: bool,
    scanned: u64,
}

impl UnreachableCommits {
    /// The next unreachable commit, or `None` once the scan is complete.
    pub async fn next(&mut self) -> GcResult<Option<CommitId>> {
        loop {
            if let Some(id) = self.buffer.pop_front() {
                return Ok(Some(id));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    /// Drain the sequence into a vector.
    pub async fn collect(mut self) -> GcResult<Vec<CommitId>> {
        let mut ids = Vec::new();
        while let Some(id) = self.next().await? {
            ids.push(id);
        }
        Ok(ids)
    }

    /// Commit keys examined so far.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    async fn fill(&mut self) -> GcResult<()> {
        let page = self
            .gc
            .backend
            .scan_keys(
                COMMIT_PREFIX,
                self.cursor.as_deref(),
                self.gc.config.scan_page_size,
            )
            .await?;
        self.scanned += page.keys.len() as u64;

        let candidates: Vec<CommitId> = page
            .keys
            .iter()
            .filter_map(|k| commit_id_from_key(k))
            .filter(|id| !self.reachable.contains(id))
            .collect();
        if !candidates.is_empty() {
            let stamps = self.gc.commits.write_stamps(&candidates).await?;
            for id in candidates {
                // Deleted since the scan: nothing left to collect.
                let Some(stamp) = stamps.get(&id) else {
                    continue;
                };
                if stamp.millis() > self.cutoff_ms {
                    debug!(commit = %id.short_hex(), "unreachable but within grace period");
                    continue;
                }
                self.buffer.push_back(id);
            }
        }

        match page.next {
            Some(next) => self.cursor = Some(next),
            None => self.exhausted = true,
        }
        Ok(())
    }
}
