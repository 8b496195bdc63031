//! Content index for Verso.
//!
//! The content index maps every live [`ContentKey`] to the pointer of its
//! current value. It is never stored per commit. Instead each commit carries
//! only its delta (the keys it puts or deletes), and the full index for a
//! commit is rebuilt by walking back to the nearest snapshot and replaying
//! deltas forward.
//!
//! Snapshots bound that walk: the engine asks
//! [`IndexManager::should_snapshot`] after every commit and persists a new
//! snapshot once the distance from the last one reaches the configured
//! interval.
//!
//! # Modules
//!
//! - [`entry`] — [`ContentIndex`], [`IndexEntry`], [`IndexDelta`], [`DiffEntry`]
//! - [`snapshot`] — segmented snapshot persistence ([`SnapshotStore`])
//! - [`manager`] — [`IndexManager`]: materialize, lookup, diff, snapshot policy
//! - [`error`] — [`IndexError`]
//!
//! [`ContentKey`]: verso_types::ContentKey

pub mod entry;
pub mod error;
pub mod manager;
pub mod snapshot;

pub use entry::{ContentIndex, DiffEntry, IndexDelta, IndexEntry};
pub use error::{IndexError, IndexResult};
pub use manager::{IndexConfig, IndexManager, Intervening, SnapshotLocation};
pub use snapshot::{SegmentRef, SnapshotHeader, SnapshotSegment, SnapshotStore};
