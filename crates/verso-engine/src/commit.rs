//! The commit protocol.
//!
//! A commit is a small state machine driven by [`VersionStore::commit`]:
//!
//! ```text
//! WriteValues -> Read -> Build -> PersistCommit -> PersistSnapshot -> Advance -> Done
//!                 ^                                                    |   |
//!                 +------------------- lost CAS -----------------------+   |
//!                 +---------------- Confirm <--- unknown CAS outcome ------+
//! ```
//!
//! Every step before `Advance` only writes immutable, content-addressed
//! items, so any of them can be repeated safely. `Advance` is the single
//! conditional write that publishes the commit. When its outcome is unknown
//! (a timeout), `Confirm` re-reads the reference instead of assuming either
//! outcome.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};
use verso_backend::keys::content_key;
use verso_commits::{Commit, Operation, ParentLink};
use verso_crypto::ContentHasher;
use verso_index::IndexError;
use verso_refs::{RefError, Reference};
use verso_types::{CommitId, ContentKey, ContentPointer};

use crate::engine::VersionStore;
use crate::error::{EngineError, EngineResult};
use crate::policy::{RebaseDecision, RebasePolicy};
use crate::request::{Change, CommitOutcome, CommitRequest, SnapshotStatus};
use crate::retry::RetryBudget;

enum Step {
    WriteValues,
    Read,
    Build {
        head: Reference,
    },
    PersistCommit {
        head: Reference,
        commit: Commit,
    },
    PersistSnapshot {
        head: Reference,
        commit: Commit,
    },
    Advance {
        head: Reference,
        commit: Commit,
        snapshot: SnapshotStatus,
    },
    Confirm {
        commit: Commit,
        snapshot: SnapshotStatus,
    },
    Done(CommitOutcome),
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Self::WriteValues => "write-values",
            Self::Read => "read",
            Self::Build { .. } => "build",
            Self::PersistCommit { .. } => "persist-commit",
            Self::PersistSnapshot { .. } => "persist-snapshot",
            Self::Advance { .. } => "advance",
            Self::Confirm { .. } => "confirm",
            Self::Done(_) => "done",
        }
    }

    /// Where to resume after a transient failure in this step.
    fn resume_point(&self) -> Step {
        match self {
            Self::WriteValues => Self::WriteValues,
            Self::Confirm { commit, snapshot } => Self::Confirm {
                commit: commit.clone(),
                snapshot: *snapshot,
            },
            _ => Self::Read,
        }
    }
}

/// State of one logical commit across its attempts.
struct CommitRun<'a> {
    store: &'a VersionStore,
    request: &'a CommitRequest,
    policy: RebasePolicy,
    ours: BTreeSet<ContentKey>,
    operations: Vec<Operation>,
    budget: RetryBudget,
    /// The head this commit is currently based on.
    base: Option<CommitId>,
    rebased: bool,
}

impl VersionStore {
    /// Commit `request` to its branch.
    ///
    /// On success the new commit is the branch head. Lost races are retried
    /// within the retry budget, consulting the request's [`RebasePolicy`]
    /// each time the head has moved; once the budget is spent the conflict
    /// is surfaced with the last known state of the branch.
    pub async fn commit(&self, request: &CommitRequest) -> EngineResult<CommitOutcome> {
        let ours = request.keys();
        if ours.len() != request.changes.len() {
            return Err(EngineError::InvalidArgument(
                "a key appears in more than one change".into(),
            ));
        }

        let mut run = CommitRun {
            store: self,
            request,
            policy: request.policy.unwrap_or(self.config.default_rebase_policy),
            ours,
            operations: operations_for(&request.changes),
            budget: self.retry.budget(),
            base: request.expected_head,
            rebased: false,
        };

        let mut step = Step::WriteValues;
        let mut recovering = false;
        loop {
            let retry_from = step.resume_point();
            let current = step.name();
            let result = match step {
                Step::WriteValues => run.write_values().await,
                Step::Read => run.read().await,
                Step::Build { head } => run.build(head).await,
                Step::PersistCommit { head, commit } => run.persist_commit(head, commit).await,
                Step::PersistSnapshot { head, commit } => {
                    Ok(run.persist_snapshot(head, commit).await)
                }
                Step::Advance {
                    head,
                    commit,
                    snapshot,
                } => run.advance(head, commit, snapshot).await,
                Step::Confirm { commit, snapshot } => run.confirm(commit, snapshot).await,
                Step::Done(outcome) => return Ok(outcome),
            };

            step = match result {
                Ok(next) => {
                    if recovering {
                        run.budget.recovered();
                        recovering = false;
                    }
                    next
                }
                Err(e) if e.is_transient() => match run.budget.next_retry() {
                    Some(delay) => {
                        recovering = true;
                        warn!(
                            reference = %request.reference,
                            step = current,
                            attempt = run.budget.attempts(),
                            error = %e,
                            "transient failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        retry_from
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            };
        }
    }
}

impl CommitRun<'_> {
    fn reference(&self) -> &str {
        &self.request.reference
    }

    async fn write_values(&mut self) -> EngineResult<Step> {
        for change in &self.request.changes {
            if let Change::Put { value, .. } = change {
                let pointer = ContentPointer::new(ContentHasher::CONTENT.hash(value));
                self.store
                    .backend
                    .put_item(&content_key(&pointer), value.clone())
                    .await?;
            }
        }
        Ok(Step::Read)
    }

    async fn read(&mut self) -> EngineResult<Step> {
        let head = self.store.refs.get_reference(self.reference()).await?;
        if head.is_tag() {
            return Err(EngineError::InvalidArgument(format!(
                "{} is a tag; commits only target branches",
                head.name
            )));
        }

        let Some(base) = self.base else {
            self.base = Some(head.commit);
            return Ok(Step::Build { head });
        };
        if base == head.commit {
            return Ok(Step::Build { head });
        }

        let theirs = if self.policy.needs_intervening_keys() {
            match self.store.index.keys_touched(&base, &head.commit).await {
                Ok(intervening) => intervening.keys,
                Err(IndexError::NotAncestor { .. }) => {
                    debug!(
                        reference = %head.name,
                        base = %base.short_hex(),
                        head = %head.commit.short_hex(),
                        "head no longer descends from base"
                    );
                    return Err(EngineError::ReferenceConflict {
                        reference: head.name.clone(),
                        last_known: Some(head),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            BTreeSet::new()
        };

        match self.policy.decide(&theirs, &self.ours) {
            RebaseDecision::Rebase => {
                debug!(
                    reference = %head.name,
                    from = %base.short_hex(),
                    onto = %head.commit.short_hex(),
                    "rebasing onto moved head"
                );
                self.base = Some(head.commit);
                self.rebased = true;
                Ok(Step::Build { head })
            }
            RebaseDecision::Abort => Err(EngineError::ReferenceConflict {
                reference: head.name.clone(),
                last_known: Some(head),
            }),
            RebaseDecision::Conflict(keys) => Err(EngineError::KeyConflict {
                reference: head.name,
                keys,
            }),
        }
    }

    async fn build(&mut self, head: Reference) -> EngineResult<Step> {
        let parent = if head.commit.is_no_ancestor() {
            ParentLink::no_ancestor()
        } else {
            ParentLink::of(&self.store.commits.get_commit(&head.commit).await?)
        };
        let commit = Commit::build(
            &parent,
            self.request.meta.clone(),
            self.operations.clone(),
            self.store.config.ancestors_per_commit,
        )?;
        Ok(Step::PersistCommit { head, commit })
    }

    async fn persist_commit(&mut self, head: Reference, commit: Commit) -> EngineResult<Step> {
        self.store.commits.put_commit(&commit).await?;
        Ok(Step::PersistSnapshot { head, commit })
    }

    /// Never fails the commit: a missed snapshot is picked up by a later
    /// commit, since the distance stays at or above the interval.
    async fn persist_snapshot(&mut self, head: Reference, commit: Commit) -> Step {
        let index = &self.store.index;
        let snapshot = match index.should_snapshot(&commit.id).await {
            Ok(false) => SnapshotStatus::NotNeeded,
            Ok(true) => match index.write_snapshot(&commit.id).await {
                Ok(_) => SnapshotStatus::Written,
                Err(e) => {
                    warn!(commit = %commit.id.short_hex(), error = %e, "snapshot write failed");
                    SnapshotStatus::Failed
                }
            },
            Err(e) => {
                warn!(commit = %commit.id.short_hex(), error = %e, "snapshot check failed");
                SnapshotStatus::Failed
            }
        };
        Step::Advance {
            head,
            commit,
            snapshot,
        }
    }

    async fn advance(
        &mut self,
        head: Reference,
        commit: Commit,
        snapshot: SnapshotStatus,
    ) -> EngineResult<Step> {
        match self.store.refs.cas_update(&head, commit.id).await {
            Ok(reference) => Ok(self.done(commit, reference, snapshot)),
            Err(RefError::VersionConflict { .. }) => self.lost_race(None).await,
            Err(e) if e.is_transient() => {
                warn!(
                    reference = %head.name,
                    commit = %commit.id.short_hex(),
                    error = %e,
                    "reference update outcome unknown, confirming"
                );
                Ok(Step::Confirm { commit, snapshot })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The update landed if the branch now holds our commit, either as its
    /// head or beneath commits another writer added since.
    async fn confirm(&mut self, commit: Commit, snapshot: SnapshotStatus) -> EngineResult<Step> {
        let current = self.store.refs.find_reference(self.reference()).await?;
        if let Some(head) = current.as_ref() {
            if self.store.descends_from(head.commit, &commit).await? {
                debug!(
                    commit = %commit.id.short_hex(),
                    head = %head.commit.short_hex(),
                    "unacknowledged update was applied"
                );
                let head = head.clone();
                return Ok(self.done(commit, head, snapshot));
            }
        }
        self.lost_race(current).await
    }

    /// Consume one retry after losing the CAS, or surface the conflict.
    async fn lost_race(&mut self, last_known: Option<Reference>) -> EngineResult<Step> {
        if let Some(delay) = self.budget.next_retry() {
            debug!(
                reference = %self.request.reference,
                attempt = self.budget.attempts(),
                delay_ms = delay.as_millis() as u64,
                "lost reference race, retrying"
            );
            tokio::time::sleep(delay).await;
            return Ok(Step::Read);
        }
        let last_known = match last_known {
            Some(r) => Some(r),
            None => self.store.refs.find_reference(self.reference()).await?,
        };
        warn!(
            reference = %self.request.reference,
            attempts = self.budget.attempts(),
            "retry budget exhausted"
        );
        Err(EngineError::ReferenceConflict {
            reference: self.request.reference.clone(),
            last_known,
        })
    }

    fn done(&self, commit: Commit, reference: Reference, snapshot: SnapshotStatus) -> Step {
        info!(
            reference = %reference.name,
            commit = %commit.id.short_hex(),
            depth = commit.depth(),
            attempts = self.budget.attempts(),
            rebased = self.rebased,
            "committed"
        );
        Step::Done(CommitOutcome {
            commit: commit.id,
            reference,
            attempts: self.budget.attempts(),
            rebased: self.rebased,
            snapshot,
        })
    }
}

fn operations_for(changes: &[Change]) -> Vec<Operation> {
    changes
        .iter()
        .map(|change| match change {
            Change::Put { key, value } => Operation::Put {
                key: key.clone(),
                content: ContentPointer::new(ContentHasher::CONTENT.hash(value)),
            },
            Change::Delete { key } => Operation::Delete { key: key.clone() },
            Change::Unchanged { key } => Operation::Unchanged { key: key.clone() },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{EngineConfig, RetryConfig};
    use crate::retry::RetryPolicy;
    use std::collections::HashMap;
    use std::time::Duration;

    use bytes::Bytes;
    use verso_backend::{
        Backend, BackendError, BackendResult, Expected, FaultInjectingBackend, FaultPlan,
        InMemoryBackend, Item, ScanPage, WriteOutcome,
    };
    use verso_refs::RefKind;
    use verso_types::CommitMeta;

    fn key(s: &str) -> ContentKey {
        ContentKey::parse(s).unwrap()
    }

    fn meta(msg: &str) -> CommitMeta {
        CommitMeta::new("tester", msg)
    }

    fn config() -> EngineConfig {
        EngineConfig {
            snapshot_interval: 4,
            retry: RetryConfig {
                max_retries: 5,
                backoff_base_ms: 0,
                backoff_max_ms: 0,
                jitter: 0.0,
            },
            ..EngineConfig::default()
        }
    }

    async fn store_with(
        backend: Arc<dyn verso_backend::Backend>,
        config: EngineConfig,
    ) -> VersionStore {
        let store = VersionStore::new(backend, config).unwrap();
        store
            .create_reference("main", RefKind::Branch, CommitId::NO_ANCESTOR)
            .await
            .unwrap();
        store
    }

    async fn value_of(store: &VersionStore, at: &str, k: &str) -> Option<Vec<u8>> {
        store
            .get_values(at, &[key(k)])
            .await
            .unwrap()
            .get(&key(k))
            .map(|b| b.to_vec())
    }

    #[tokio::test]
    async fn first_commit_advances_branch() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let out = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();
        assert_eq!(out.attempts, 1);
        assert!(!out.rebased);
        assert_eq!(out.reference.commit, out.commit);
        assert_eq!(out.reference.version, 2);
        assert_eq!(value_of(&store, "main", "a").await, Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn stale_base_rebases_disjoint_change() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let c0 = store
            .commit(&CommitRequest::new("main", meta("c0")))
            .await
            .unwrap()
            .commit;
        let c1 = store
            .commit(
                &CommitRequest::new("main", meta("c1"))
                    .expecting(c0)
                    .put(key("a"), &b"1"[..]),
            )
            .await
            .unwrap()
            .commit;

        // Prepared against c0, arrives after c1.
        let out = store
            .commit(
                &CommitRequest::new("main", meta("c2"))
                    .expecting(c0)
                    .put(key("b"), &b"2"[..]),
            )
            .await
            .unwrap();
        assert!(out.rebased);

        let head = store.commits().get_commit(&out.commit).await.unwrap();
        assert_eq!(head.parent(), Some(c1));
        assert_eq!(value_of(&store, "main", "a").await, Some(b"1".to_vec()));
        assert_eq!(value_of(&store, "main", "b").await, Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn overlapping_change_is_a_key_conflict() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let c0 = store
            .commit(&CommitRequest::new("main", meta("c0")))
            .await
            .unwrap()
            .commit;
        store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();

        let err = store
            .commit(
                &CommitRequest::new("main", meta("c2"))
                    .expecting(c0)
                    .put(key("a"), &b"2"[..])
                    .put(key("z"), &b"2"[..]),
            )
            .await
            .unwrap_err();
        match err {
            EngineError::KeyConflict { reference, keys } => {
                assert_eq!(reference, "main");
                assert_eq!(keys, vec![key("a")]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(value_of(&store, "main", "a").await, Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn unchanged_keys_take_part_in_conflicts() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let c0 = store
            .commit(&CommitRequest::new("main", meta("c0")))
            .await
            .unwrap()
            .commit;
        store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();
        let err = store
            .commit(
                &CommitRequest::new("main", meta("c2"))
                    .expecting(c0)
                    .unchanged(key("a"))
                    .put(key("b"), &b"1"[..]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::KeyConflict { .. }));
    }

    #[tokio::test]
    async fn abort_on_move_refuses_any_movement() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let c0 = store
            .commit(&CommitRequest::new("main", meta("c0")))
            .await
            .unwrap()
            .commit;
        let c1 = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap()
            .commit;
        let err = store
            .commit(
                &CommitRequest::new("main", meta("c2"))
                    .expecting(c0)
                    .put(key("b"), &b"1"[..])
                    .with_policy(RebasePolicy::AbortOnMove),
            )
            .await
            .unwrap_err();
        match err {
            EngineError::ReferenceConflict {
                last_known: Some(r),
                ..
            } => assert_eq!(r.commit, c1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn always_rebase_ignores_overlap() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let c0 = store
            .commit(&CommitRequest::new("main", meta("c0")))
            .await
            .unwrap()
            .commit;
        store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();
        let out = store
            .commit(
                &CommitRequest::new("main", meta("c2"))
                    .expecting(c0)
                    .put(key("a"), &b"2"[..])
                    .with_policy(RebasePolicy::AlwaysRebase),
            )
            .await
            .unwrap();
        assert!(out.rebased);
        assert_eq!(value_of(&store, "main", "a").await, Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn lost_races_are_retried() {
        let faulty = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new()));
        let store = store_with(faulty.clone(), config()).await;
        faulty.set_plan(FaultPlan {
            cas_conflicts: 2,
            ..FaultPlan::default()
        });
        let out = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(faulty.injected(), 2);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_reference_conflict() {
        let faulty = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new()));
        let store = store_with(faulty.clone(), config())
            .await
            .with_retry_policy(RetryPolicy::immediate(1));
        faulty.set_plan(FaultPlan {
            cas_conflicts: 2,
            ..FaultPlan::default()
        });
        let err = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap_err();
        match err {
            EngineError::ReferenceConflict {
                reference,
                last_known: Some(r),
            } => {
                assert_eq!(reference, "main");
                assert!(r.commit.is_no_ancestor());
                assert_eq!(r.version, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
        // Built commits were stored even though none was published.
        assert!(!faulty.inner().keys_with_prefix("commit/").is_empty());
    }

    #[tokio::test]
    async fn unacknowledged_update_is_confirmed() {
        let faulty = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new()));
        let store = store_with(faulty.clone(), config()).await;
        faulty.set_plan(FaultPlan {
            lost_acks: 1,
            ..FaultPlan::default()
        });
        let out = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();
        assert_eq!(out.attempts, 1);
        assert_eq!(out.reference.version, 2);
        let head = store.get_reference("main").await.unwrap();
        assert_eq!(head.commit, out.commit);
        // Exactly one commit was built and published.
        assert_eq!(faulty.inner().keys_with_prefix("commit/").len(), 1);
    }

    /// Applies the first guarded write to `ref/main`, lets another store
    /// commit on top of it, then reports a timeout.
    struct AdvancedBeforeAck {
        inner: Arc<InMemoryBackend>,
        interloper: std::sync::Mutex<Option<VersionStore>>,
    }

    #[async_trait::async_trait]
    impl Backend for AdvancedBeforeAck {
        async fn get_item(&self, key: &str) -> BackendResult<Option<Item>> {
            self.inner.get_item(key).await
        }

        async fn put_item(&self, key: &str, value: Bytes) -> BackendResult<()> {
            self.inner.put_item(key, value).await
        }

        async fn conditional_put_item(
            &self,
            key: &str,
            expected: Expected,
            item: Item,
        ) -> BackendResult<WriteOutcome> {
            let interloper = match expected {
                Expected::Version(_) if key == "ref/main" => {
                    self.interloper.lock().unwrap().take()
                }
                _ => None,
            };
            let outcome = self.inner.conditional_put_item(key, expected, item).await?;
            let Some(other) = interloper else {
                return Ok(outcome);
            };
            other
                .commit(&CommitRequest::new("main", meta("theirs")).put(ContentKey::parse("y").unwrap(), &b"2"[..]))
                .await
                .unwrap();
            Err(BackendError::Timeout {
                operation: "conditional_put_item",
                after: Duration::ZERO,
            })
        }

        async fn conditional_delete_item(
            &self,
            key: &str,
            expected_version: u64,
        ) -> BackendResult<WriteOutcome> {
            self.inner.conditional_delete_item(key, expected_version).await
        }

        async fn delete_item(&self, key: &str) -> BackendResult<bool> {
            self.inner.delete_item(key).await
        }

        async fn batch_get_items(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
            self.inner.batch_get_items(keys).await
        }

        async fn scan_keys(
            &self,
            prefix: &str,
            start_after: Option<&str>,
            limit: usize,
        ) -> BackendResult<ScanPage> {
            self.inner.scan_keys(prefix, start_after, limit).await
        }
    }

    #[tokio::test]
    async fn unacknowledged_update_buried_by_another_writer_is_confirmed() {
        for policy in [
            RebasePolicy::AbortOnMove,
            RebasePolicy::RebaseDisjoint,
            RebasePolicy::AlwaysRebase,
        ] {
            let inner = Arc::new(InMemoryBackend::new());
            let backend = Arc::new(AdvancedBeforeAck {
                inner: inner.clone(),
                interloper: std::sync::Mutex::new(None),
            });
            let ours = store_with(backend.clone(), config()).await;
            let theirs = VersionStore::new(inner.clone(), config()).unwrap();
            *backend.interloper.lock().unwrap() = Some(theirs);

            let out = ours
                .commit(
                    &CommitRequest::new("main", meta("ours"))
                        .put(key("x"), &b"1"[..])
                        .with_policy(policy),
                )
                .await
                .unwrap_or_else(|e| panic!("{policy:?}: {e}"));
            assert!(!out.rebased);

            // Our commit is on the branch exactly once, under theirs.
            let log = ours.commit_log("main", 10).await.unwrap();
            assert_eq!(log.len(), 2, "{policy:?}");
            assert_eq!(log[1].id, out.commit);
            assert_eq!(log[0].parent(), Some(out.commit));
            assert_eq!(out.reference.commit, log[0].id);
            assert!(ours.hash_on_reference("main", &out.commit).await.unwrap());
            assert_eq!(value_of(&ours, "main", "x").await, Some(b"1".to_vec()));
            assert_eq!(value_of(&ours, "main", "y").await, Some(b"2".to_vec()));
            assert_eq!(inner.keys_with_prefix("commit/").len(), 2);
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let faulty = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new()));
        let store = store_with(faulty.clone(), config()).await;
        faulty.set_plan(FaultPlan {
            fail_next: 2,
            ..FaultPlan::default()
        });
        let out = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn persistent_outage_surfaces_transient_error() {
        let faulty = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new()));
        let store = store_with(faulty.clone(), config()).await;
        faulty.set_plan(FaultPlan {
            fail_next: 100,
            ..FaultPlan::default()
        });
        let err = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn snapshot_failure_does_not_block_commit() {
        let faulty = Arc::new(FaultInjectingBackend::new(InMemoryBackend::new()));
        let store = store_with(
            faulty.clone(),
            EngineConfig {
                snapshot_interval: 1,
                ..config()
            },
        )
        .await;
        faulty.set_plan(FaultPlan {
            fail_writes_with_prefix: Some("segment/".into()),
            ..FaultPlan::default()
        });
        let out = store
            .commit(&CommitRequest::new("main", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap();
        assert_eq!(out.snapshot, SnapshotStatus::Failed);
        assert_eq!(value_of(&store, "main", "a").await, Some(b"1".to_vec()));

        // The next commit picks the missed snapshot up.
        faulty.set_plan(FaultPlan::default());
        let out = store
            .commit(&CommitRequest::new("main", meta("c2")).put(key("b"), &b"1"[..]))
            .await
            .unwrap();
        assert_eq!(out.snapshot, SnapshotStatus::Written);
    }

    #[tokio::test]
    async fn snapshots_are_written_at_the_interval() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let mut statuses = Vec::new();
        for i in 0..8 {
            let out = store
                .commit(
                    &CommitRequest::new("main", meta(&format!("c{i}")))
                        .put(key("k"), vec![i as u8]),
                )
                .await
                .unwrap();
            statuses.push(out.snapshot);
        }
        let written: Vec<usize> = statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == SnapshotStatus::Written)
            .map(|(i, _)| i)
            .collect();
        // Depths 4 and 8.
        assert_eq!(written, vec![3, 7]);
    }

    #[tokio::test]
    async fn committing_to_a_tag_is_rejected() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        store
            .create_reference("v1", RefKind::Tag, CommitId::NO_ANCESTOR)
            .await
            .unwrap();
        let err = store
            .commit(&CommitRequest::new("v1", meta("c1")).put(key("a"), &b"1"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let err = store
            .commit(
                &CommitRequest::new("main", meta("c1"))
                    .put(key("a"), &b"1"[..])
                    .delete(key("a")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn missing_branch_is_not_found() {
        let store = store_with(Arc::new(InMemoryBackend::new()), config()).await;
        let err = store
            .commit(&CommitRequest::new("nope", meta("c1")))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReferenceNotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_commits_all_land() {
        let backend: Arc<dyn verso_backend::Backend> = Arc::new(InMemoryBackend::new());
        let store = store_with(
            backend,
            EngineConfig {
                retry: RetryConfig {
                    max_retries: 64,
                    backoff_base_ms: 1,
                    backoff_max_ms: 4,
                    jitter: 0.5,
                },
                ..config()
            },
        )
        .await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .commit(
                        &CommitRequest::new("main", meta(&format!("writer {i}")))
                            .put(key(&format!("w{i}")), vec![i as u8]),
                    )
                    .await
            }));
        }
        let mut winners = BTreeSet::new();
        for task in tasks {
            winners.insert(task.await.unwrap().unwrap().commit);
        }
        assert_eq!(winners.len(), 8);

        let log = store.commit_log("main", 100).await.unwrap();
        let on_branch: BTreeSet<CommitId> = log.iter().map(|c| c.id).collect();
        assert_eq!(on_branch, winners);
        let index = store.materialize("main").await.unwrap();
        assert_eq!(index.len(), 8);
    }
}
