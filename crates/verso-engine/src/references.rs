//! Reference management through the engine.
//!
//! Unlike [`ReferenceStore`](verso_refs::ReferenceStore), these operations
//! check their targets exist, pin them against collection, and retry lost
//! races the same way commits do, as long as the reference still points
//! where the caller expects.

use tracing::{debug, info};
use verso_refs::{RefError, RefKind, Reference};
use verso_types::CommitId;

use crate::engine::VersionStore;
use crate::error::{EngineError, EngineResult};

impl VersionStore {
    /// Create a reference pointing at `target`, which must be a stored
    /// commit or the no-ancestor id.
    pub async fn create_reference(
        &self,
        name: &str,
        kind: RefKind,
        target: CommitId,
    ) -> EngineResult<Reference> {
        self.pin_commit(&target).await?;
        let mut budget = self.retry.budget();
        loop {
            match self.refs.create_reference(name, kind, target).await {
                Ok(created) => {
                    info!(reference = name, %kind, target = %target.short_hex(), "created reference");
                    return Ok(created);
                }
                Err(e) if e.is_transient() => {
                    // A lost acknowledgement may have created it already.
                    match budget.next_retry() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => return Err(e.into()),
                    }
                    if let Some(existing) = self.refs.find_reference(name).await? {
                        if existing.kind == kind && existing.commit == target {
                            return Ok(existing);
                        }
                        return Err(EngineError::ReferenceExists(name.to_string()));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn get_reference(&self, name: &str) -> EngineResult<Reference> {
        Ok(self.refs.get_reference(name).await?)
    }

    /// All references, in name order.
    pub async fn list_references(&self) -> EngineResult<Vec<Reference>> {
        Ok(self.refs.list_references().await?)
    }

    /// Point `name` at `target`.
    ///
    /// With `expected_head`, the reassignment only happens while the
    /// reference still points there; otherwise the current head is
    /// overwritten whatever it is.
    pub async fn assign_reference(
        &self,
        name: &str,
        expected_head: Option<CommitId>,
        target: CommitId,
    ) -> EngineResult<Reference> {
        self.pin_commit(&target).await?;
        let mut budget = self.retry.budget();
        loop {
            let current = self.refs.get_reference(name).await?;
            check_expected(&current, expected_head)?;
            if current.commit == target {
                return Ok(current);
            }
            match self.refs.cas_update(&current, target).await {
                Ok(updated) => {
                    info!(
                        reference = name,
                        from = %current.commit.short_hex(),
                        to = %target.short_hex(),
                        "reassigned reference"
                    );
                    return Ok(updated);
                }
                Err(RefError::VersionConflict { .. }) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e.into()),
            }
            match budget.next_retry() {
                Some(delay) => {
                    debug!(reference = name, attempt = budget.attempts(), "retrying reassignment");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(EngineError::ReferenceConflict {
                        reference: name.to_string(),
                        last_known: self.refs.find_reference(name).await?,
                    })
                }
            }
        }
    }

    /// Delete `name`, guarded by `expected_head` the same way as
    /// [`Self::assign_reference`].
    pub async fn delete_reference(
        &self,
        name: &str,
        expected_head: Option<CommitId>,
    ) -> EngineResult<()> {
        let mut budget = self.retry.budget();
        loop {
            let current = self.refs.get_reference(name).await?;
            check_expected(&current, expected_head)?;
            match self.refs.delete_reference(name, current.version).await {
                Ok(()) => {
                    info!(reference = name, head = %current.commit.short_hex(), "deleted reference");
                    return Ok(());
                }
                Err(RefError::VersionConflict { .. }) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e.into()),
            }
            match budget.next_retry() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    return Err(EngineError::ReferenceConflict {
                        reference: name.to_string(),
                        last_known: self.refs.find_reference(name).await?,
                    })
                }
            }
        }
    }

    /// Check `id` is stored and refresh its write stamp, so a collection
    /// that found it unreachable before this reference update cannot delete
    /// it afterwards.
    async fn pin_commit(&self, id: &CommitId) -> EngineResult<()> {
        if self.commits.touch(id).await? {
            Ok(())
        } else {
            Err(EngineError::CommitNotFound(*id))
        }
    }
}

fn check_expected(current: &Reference, expected_head: Option<CommitId>) -> EngineResult<()> {
    match expected_head {
        Some(expected) if expected != current.commit => Err(EngineError::ReferenceConflict {
            reference: current.name.clone(),
            last_known: Some(current.clone()),
        }),
        _ => Ok(()),
    }
}
