//! Content hashing for Verso.
//!
//! Every record Verso persists under a content-derived key is hashed through
//! a [`ContentHasher`] carrying a domain tag, so records of different kinds
//! can never collide even when their bytes match.

pub mod hasher;

pub use hasher::ContentHasher;
