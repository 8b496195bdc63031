use std::sync::Arc;

use verso_backend::{Backend, TimedBackend};
use verso_commits::CommitStore;
use verso_index::{IndexManager, SnapshotStore};
use verso_refs::ReferenceStore;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::retry::RetryPolicy;

/// A versioned key-value store over a single-item CAS backend.
///
/// Cheap to clone; clones share the backend. Any number of instances, in
/// any number of processes, may operate on the same backend at once.
#[derive(Clone)]
pub struct VersionStore {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) commits: CommitStore,
    pub(crate) index: IndexManager,
    pub(crate) refs: ReferenceStore,
    pub(crate) config: EngineConfig,
    pub(crate) retry: RetryPolicy,
}

impl VersionStore {
    /// Open a store over `backend`. Every backend call is given the
    /// configured timeout.
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let timed: Arc<dyn Backend> = Arc::new(TimedBackend::new(backend, config.call_timeout()));
        let commits = CommitStore::new(timed.clone());
        let index = IndexManager::new(
            commits.clone(),
            SnapshotStore::new(timed.clone()),
            config.index_config(),
        );
        Ok(Self {
            refs: ReferenceStore::new(timed.clone()),
            retry: RetryPolicy::from(&config.retry),
            backend: timed,
            commits,
            index,
            config,
        })
    }

    /// Replace the retry policy derived from the configuration.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn commits(&self) -> &CommitStore {
        &self.commits
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    pub fn references(&self) -> &ReferenceStore {
        &self.refs
    }

    /// The timed backend every component shares.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
