//! Garbage collection for Verso.
//!
//! Commits that lose a race, or that a reassigned or deleted reference leaves
//! behind, stay in the backend until collected. Collection is mark and sweep:
//!
//! 1. [`GarbageCollector::find_unreachable`] marks everything reachable from
//!    the live references, then lazily scans stored commits and reports the
//!    unmarked ones not written or pinned within the grace period.
//! 2. [`GarbageCollector::sweep`] marks again, then deletes each reported
//!    commit whose write stamp has not moved, the snapshots anchored at
//!    them, and any snapshot segments left unused.
//!
//! Content values are shared between commits by hash and are not collected.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use verso_backend::InMemoryBackend;
//! use verso_gc::{GarbageCollector, GcConfig};
//!
//! # async fn run() -> Result<(), verso_gc::GcError> {
//! let config = GcConfig::default();
//! let gc = GarbageCollector::new(Arc::new(InMemoryBackend::new()), config.clone());
//! let params = config.params_at(Utc::now());
//! let ids = gc.find_unreachable(None, params).await?.collect().await?;
//! let report = gc.sweep(&ids, None, params).await?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod error;

pub use collector::{GarbageCollector, GcReport, UnreachableCommits};
pub use config::{GcConfig, GcParams};
pub use error::{GcError, GcResult};
