//! Foundation types for Verso.
//!
//! Verso persists a git-like commit graph on top of a key-value backend that
//! only offers single-item conditional writes. Every other Verso crate depends
//! on `verso-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] — Content-addressed identifier (BLAKE3 hash)
//! - [`CommitId`] — Identifier of a commit, with a no-ancestor sentinel
//! - [`ContentPointer`] — Identifier of a stored content value
//! - [`ContentKey`] — Multi-element key addressing content in the index
//! - [`CommitMeta`] — Author, message, and timestamp of a commit

pub mod error;
pub mod ids;
pub mod key;
pub mod meta;
pub mod object;

pub use error::TypeError;
pub use ids::{CommitId, ContentPointer};
pub use key::ContentKey;
pub use meta::CommitMeta;
pub use object::ObjectId;
