//! Consistency engine for Verso.
//!
//! Verso is a versioned key-value store that needs nothing from its backend
//! but single-item conditional writes. Commits are immutable and
//! content-addressed, so writing them never conflicts; the only contended
//! write is the compare-and-swap that advances a branch. [`VersionStore`]
//! drives that protocol and retries lost races within a bounded
//! [`RetryPolicy`], rebasing according to a [`RebasePolicy`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use verso_backend::InMemoryBackend;
//! use verso_engine::{CommitRequest, EngineConfig, VersionStore};
//! use verso_refs::RefKind;
//! use verso_types::{CommitId, CommitMeta, ContentKey};
//!
//! # async fn run() -> Result<(), verso_engine::EngineError> {
//! let store = VersionStore::new(Arc::new(InMemoryBackend::new()), EngineConfig::default())?;
//! store.create_reference("main", RefKind::Branch, CommitId::NO_ANCESTOR).await?;
//!
//! let key = ContentKey::parse("docs.readme")?;
//! let request = CommitRequest::new("main", CommitMeta::new("alice", "add readme"))
//!     .put(key.clone(), &b"hello"[..]);
//! store.commit(&request).await?;
//!
//! let values = store.get_values("main", &[key]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`engine`] — [`VersionStore`] construction
//! - [`commit`] — the commit state machine
//! - [`references`] — create, reassign, delete, list
//! - [`read`] — point-in-time reads by reference or commit
//! - [`policy`] — [`RebasePolicy`]
//! - [`retry`] — [`RetryPolicy`], [`RetryBudget`], [`Backoff`]
//! - [`config`] — [`EngineConfig`], [`RetryConfig`]
//! - [`error`] — [`EngineError`]

pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod read;
pub mod references;
pub mod request;
pub mod retry;

pub use config::{EngineConfig, RetryConfig};
pub use engine::VersionStore;
pub use error::{EngineError, EngineResult};
pub use policy::{RebaseDecision, RebasePolicy};
pub use read::Target;
pub use request::{Change, CommitOutcome, CommitRequest, SnapshotStatus};
pub use retry::{Backoff, RetryBudget, RetryPolicy};
