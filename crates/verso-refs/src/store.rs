//! Backend-resident reference storage.

use std::sync::Arc;

use tracing::debug;
use verso_backend::keys::{ref_key, REF_PREFIX};
use verso_backend::{codec, Backend, Expected, Item, WriteOutcome};
use verso_types::CommitId;

use crate::error::{RefError, RefResult};
use crate::names::validate_reference_name;
use crate::types::{RefKind, RefRecord, Reference};

/// Keys requested per page when listing references.
const LIST_PAGE_SIZE: usize = 100;

/// Reference storage over a [`Backend`].
///
/// Holds no state of its own: every read goes to the backend, and every
/// write is conditional on the version the caller last saw.
#[derive(Clone)]
pub struct ReferenceStore {
    backend: Arc<dyn Backend>,
}

impl ReferenceStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Create a reference.
    ///
    /// A new name starts at version 1. A name that was deleted continues
    /// from its last version, so tokens read before the delete never match
    /// the new incarnation.
    pub async fn create_reference(
        &self,
        name: &str,
        kind: RefKind,
        commit: CommitId,
    ) -> RefResult<Reference> {
        validate_reference_name(name)?;
        let key = ref_key(name);
        let bytes = codec::encode(&RefRecord::Live { kind, commit })?;
        loop {
            let (expected, version) = match self.read_slot(name).await? {
                None => (Expected::Absent, 1),
                Some((RefRecord::Deleted, v)) => (Expected::Version(v), v + 1),
                Some((RefRecord::Live { .. }, _)) => {
                    return Err(RefError::AlreadyExists {
                        name: name.to_string(),
                    })
                }
            };
            let outcome = self
                .backend
                .conditional_put_item(&key, expected, Item::new(bytes.clone(), version))
                .await?;
            if outcome.is_applied() {
                debug!(reference = name, %kind, commit = %commit.short_hex(), version, "created reference");
                return Ok(Reference {
                    name: name.to_string(),
                    kind,
                    commit,
                    version,
                });
            }
            // Raced with another create or delete; look again.
        }
    }

    /// Read a reference.
    pub async fn get_reference(&self, name: &str) -> RefResult<Reference> {
        self.find_reference(name)
            .await?
            .ok_or_else(|| RefError::NotFound {
                name: name.to_string(),
            })
    }

    /// Read a reference, returning `Ok(None)` if it does not exist.
    pub async fn find_reference(&self, name: &str) -> RefResult<Option<Reference>> {
        Ok(self
            .read_slot(name)
            .await?
            .and_then(|(record, version)| live(name, record, version)))
    }

    async fn read_slot(&self, name: &str) -> RefResult<Option<(RefRecord, u64)>> {
        match self.backend.get_item(&ref_key(name)).await? {
            Some(item) => Ok(Some((decode(name, &item)?, item.version))),
            None => Ok(None),
        }
    }

    /// Point `expected.name` at `new_commit` iff its stored version still
    /// equals `expected.version`. The returned reference carries the bumped
    /// version.
    pub async fn cas_update(
        &self,
        expected: &Reference,
        new_commit: CommitId,
    ) -> RefResult<Reference> {
        let name = expected.name.as_str();
        let version = expected.version + 1;
        let bytes = codec::encode(&RefRecord::Live {
            kind: expected.kind,
            commit: new_commit,
        })?;
        let outcome = self
            .backend
            .conditional_put_item(
                &ref_key(name),
                Expected::Version(expected.version),
                Item::new(bytes, version),
            )
            .await?;

        match outcome {
            WriteOutcome::Applied => {
                debug!(
                    reference = name,
                    from = %expected.commit.short_hex(),
                    to = %new_commit.short_hex(),
                    version,
                    "advanced reference"
                );
                Ok(Reference {
                    name: name.to_string(),
                    kind: expected.kind,
                    commit: new_commit,
                    version,
                })
            }
            WriteOutcome::ConditionFailed => {
                let actual = self.find_reference(name).await?.map(|r| r.version);
                debug!(reference = name, expected = expected.version, ?actual, "reference moved");
                Err(RefError::VersionConflict {
                    name: name.to_string(),
                    expected: expected.version,
                    actual,
                })
            }
        }
    }

    /// Delete a reference iff its stored version equals `expected_version`.
    pub async fn delete_reference(&self, name: &str, expected_version: u64) -> RefResult<()> {
        let bytes = codec::encode(&RefRecord::Deleted)?;
        let outcome = self
            .backend
            .conditional_put_item(
                &ref_key(name),
                Expected::Version(expected_version),
                Item::new(bytes, expected_version + 1),
            )
            .await?;
        if outcome.is_applied() {
            debug!(reference = name, version = expected_version, "deleted reference");
            return Ok(());
        }
        match self.find_reference(name).await? {
            None => Err(RefError::NotFound {
                name: name.to_string(),
            }),
            Some(current) => Err(RefError::VersionConflict {
                name: name.to_string(),
                expected: expected_version,
                actual: Some(current.version),
            }),
        }
    }

    /// All references, in name order.
    ///
    /// Not a consistent snapshot: references created or deleted while the
    /// listing pages through the backend may or may not appear.
    pub async fn list_references(&self) -> RefResult<Vec<Reference>> {
        let mut references = Vec::new();
        let mut start_after: Option<String> = None;
        loop {
            let page = self
                .backend
                .scan_keys(REF_PREFIX, start_after.as_deref(), LIST_PAGE_SIZE)
                .await?;
            if !page.keys.is_empty() {
                let mut items = self.backend.batch_get_items(&page.keys).await?;
                for key in &page.keys {
                    let Some(item) = items.remove(key) else {
                        continue;
                    };
                    let name = key.strip_prefix(REF_PREFIX).unwrap_or(key);
                    references.extend(live(name, decode(name, &item)?, item.version));
                }
            }
            match page.next {
                Some(next) => start_after = Some(next),
                None => break,
            }
        }
        Ok(references)
    }
}

impl std::fmt::Debug for ReferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceStore").finish_non_exhaustive()
    }
}

fn decode(name: &str, item: &Item) -> RefResult<RefRecord> {
    codec::decode(&item.value).map_err(|e| RefError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn live(name: &str, record: RefRecord, version: u64) -> Option<Reference> {
    match record {
        RefRecord::Live { kind, commit } => Some(Reference {
            name: name.to_string(),
            kind,
            commit,
            version,
        }),
        RefRecord::Deleted => None,
    }
}
