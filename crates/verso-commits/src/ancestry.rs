//! Lazy ancestry traversal.
//!
//! [`AncestryWalk`] yields commits newest to oldest, one `next()` call at a
//! time, without recursion. Whenever its buffer runs dry it reads the
//! current commit's ancestor list and fetches that whole window with a
//! single batch read, so a walk of `n` commits costs roughly
//! `n / ancestors_per_commit` backend round-trips.

use std::collections::HashMap;

use verso_types::CommitId;

use crate::commit::Commit;
use crate::error::{CommitError, CommitResult};
use crate::store::CommitStore;

/// Newest-to-oldest walk over a commit's history.
pub struct AncestryWalk {
    store: CommitStore,
    start: CommitId,
    limit: usize,
    next: Option<CommitId>,
    buffer: HashMap<CommitId, Commit>,
    remaining: usize,
    yielded: usize,
}

impl AncestryWalk {
    pub(crate) fn new(store: CommitStore, start: CommitId, limit: usize) -> Self {
        Self {
            store,
            start,
            limit,
            next: (!start.is_no_ancestor()).then_some(start),
            buffer: HashMap::new(),
            remaining: limit,
            yielded: 0,
        }
    }

    /// The next commit, or `None` once the root or the limit is reached.
    pub async fn next(&mut self) -> CommitResult<Option<Commit>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let Some(id) = self.next else {
            return Ok(None);
        };

        let commit = match self.buffer.remove(&id) {
            Some(commit) => commit,
            None => self.store.get_commit(&id).await?,
        };

        self.remaining -= 1;
        self.yielded += 1;
        self.next = commit.parent();

        if self.buffer.is_empty() && self.remaining > 0 && self.next.is_some() {
            let window: Vec<CommitId> = commit
                .body
                .ancestors
                .iter()
                .take(self.remaining)
                .copied()
                .collect();
            if window.len() > 1 {
                self.buffer = self.store.get_commits(&window).await?;
            }
        }

        Ok(Some(commit))
    }

    /// Whether the walk stopped at its limit with history left to visit.
    pub fn truncated(&self) -> bool {
        self.remaining == 0 && self.next.is_some()
    }

    /// Number of commits yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Drain the walk into a vector.
    pub async fn collect(mut self) -> CommitResult<Vec<Commit>> {
        let mut commits = Vec::new();
        while let Some(commit) = self.next().await? {
            commits.push(commit);
        }
        Ok(commits)
    }

    /// Drain the walk, failing if history continues past the limit.
    pub async fn collect_complete(mut self) -> CommitResult<Vec<Commit>> {
        let mut commits = Vec::new();
        while let Some(commit) = self.next().await? {
            commits.push(commit);
        }
        if self.truncated() {
            return Err(CommitError::TraversalLimit {
                start: self.start,
                limit: self.limit,
            });
        }
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commit::tests::{meta, put};
    use crate::commit::ParentLink;
    use verso_backend::InMemoryBackend;

    async fn chain(store: &CommitStore, len: usize, ancestors: usize) -> Vec<Commit> {
        let mut link = ParentLink::no_ancestor();
        let mut commits = Vec::new();
        for i in 0..len {
            let c = Commit::build(
                &link,
                meta(&format!("c{i}")),
                vec![put(&format!("k{i}"), b"v")],
                ancestors,
            )
            .unwrap();
            store.put_commit(&c).await.unwrap();
            link = ParentLink::of(&c);
            commits.push(c);
        }
        commits
    }

    #[tokio::test]
    async fn walks_newest_to_oldest() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = CommitStore::new(backend);
        let commits = chain(&store, 5, 3).await;

        let walked = store
            .ancestry(commits[4].id, usize::MAX)
            .collect()
            .await
            .unwrap();
        let ids: Vec<CommitId> = walked.iter().map(|c| c.id).collect();
        let expected: Vec<CommitId> = commits.iter().rev().map(|c| c.id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn stops_at_limit() {
        let store = CommitStore::new(Arc::new(InMemoryBackend::new()));
        let commits = chain(&store, 10, 4).await;

        let mut walk = store.ancestry(commits[9].id, 3);
        let mut n = 0;
        while walk.next().await.unwrap().is_some() {
            n += 1;
        }
        assert_eq!(n, 3);
        assert!(walk.truncated());
        assert_eq!(walk.yielded(), 3);
    }

    #[tokio::test]
    async fn reaching_root_is_not_truncation() {
        let store = CommitStore::new(Arc::new(InMemoryBackend::new()));
        let commits = chain(&store, 3, 4).await;
        let mut walk = store.ancestry(commits[2].id, 3);
        while walk.next().await.unwrap().is_some() {}
        assert!(!walk.truncated());
    }

    #[tokio::test]
    async fn collect_complete_reports_limit() {
        let store = CommitStore::new(Arc::new(InMemoryBackend::new()));
        let commits = chain(&store, 6, 2).await;
        let err = store
            .ancestry(commits[5].id, 4)
            .collect_complete()
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::TraversalLimit { limit: 4, .. }));
    }

    #[tokio::test]
    async fn no_ancestor_yields_nothing() {
        let store = CommitStore::new(Arc::new(InMemoryBackend::new()));
        let mut walk = store.ancestry(CommitId::NO_ANCESTOR, 10);
        assert!(walk.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prefetches_ancestor_windows() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = CommitStore::new(backend.clone());
        let commits = chain(&store, 9, 4).await;
        let gets_before = backend.stats().gets;

        let walked = store
            .ancestry(commits[8].id, usize::MAX)
            .collect()
            .await
            .unwrap();
        assert_eq!(walked.len(), 9);
        // One single read for the head, the rest in batches of four.
        assert_eq!(backend.stats().gets - gets_before, 1);
        assert!(backend.stats().batch_gets >= 2);
    }

    #[tokio::test]
    async fn missing_ancestor_surfaces_not_found() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = CommitStore::new(backend);
        let commits = chain(&store, 4, 1).await;
        store.delete_commit(&commits[1].id).await.unwrap();

        let err = store
            .ancestry(commits[3].id, usize::MAX)
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::NotFound(id) if id == commits[1].id));
    }
}
