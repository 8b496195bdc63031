//! Reference management for Verso.
//!
//! A reference is a named, mutable pointer to a commit. Every reference
//! carries a version that the backend bumps on each successful update, and
//! every update is a compare-and-swap against that version. This is the only
//! place in Verso where concurrent writers contend.
//!
//! # Architecture
//!
//! - **Branches** are advanced by commits and reassigned by callers.
//! - **Tags** point at a fixed commit; commits never target them, though
//!   they can be reassigned or deleted explicitly.
//!
//! # Modules
//!
//! - [`error`] — [`RefError`]
//! - [`types`] — [`Reference`], [`RefKind`]
//! - [`names`] — git-style name validation
//! - [`store`] — [`ReferenceStore`] over a backend

pub mod error;
pub mod names;
pub mod store;
pub mod types;

pub use error::{RefError, RefResult};
pub use names::validate_reference_name;
pub use store::ReferenceStore;
pub use types::{RefKind, Reference};
