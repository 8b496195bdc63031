//! Commit storage for Verso.
//!
//! Commits form a parent-linked DAG. Each commit is stored once, under the
//! domain-separated hash of its own encoded body, so:
//!
//! 1. Writing the same commit twice is a no-op.
//! 2. A commit cannot name itself or a descendant as parent, so the graph
//!    has no cycles.
//! 3. A stored commit whose bytes no longer hash to its id is corrupt, and
//!    is reported as such rather than returned.
//!
//! Each stored commit also carries a [`WriteStamp`]: the time it was last
//! written or pinned by a reference update. Collection is fenced on it.
//!
//! # Modules
//!
//! - [`commit`] — [`Commit`], [`CommitBody`], and the [`Operation`] payload
//! - [`store`] — [`CommitStore`]: put/get/batch-get/delete over a backend
//! - [`ancestry`] — [`AncestryWalk`]: lazy newest-to-oldest traversal
//! - [`error`] — [`CommitError`]

pub mod ancestry;
pub mod commit;
pub mod error;
pub mod store;

pub use ancestry::AncestryWalk;
pub use commit::{Commit, CommitBody, Operation, ParentLink};
pub use error::{CommitError, CommitResult};
pub use store::{CommitStore, PutOutcome, WriteStamp};
