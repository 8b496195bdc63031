//! Item key layout.
//!
//! Every record kind lives under its own prefix so scans never mix kinds:
//!
//! - `commit/<hex>` -- commit records
//! - `content/<hex>` -- content values
//! - `snapshot/<hex>` -- snapshot headers, keyed by anchor commit
//! - `segment/<hex>` -- snapshot segments
//! - `ref/<name>` -- references

use verso_types::{CommitId, ContentPointer, ObjectId};

pub const COMMIT_PREFIX: &str = "commit/";
pub const CONTENT_PREFIX: &str = "content/";
pub const SNAPSHOT_PREFIX: &str = "snapshot/";
pub const SEGMENT_PREFIX: &str = "segment/";
pub const REF_PREFIX: &str = "ref/";

pub fn commit_key(id: &CommitId) -> String {
    format!("{COMMIT_PREFIX}{}", id.to_hex())
}

pub fn content_key(pointer: &ContentPointer) -> String {
    format!("{CONTENT_PREFIX}{}", pointer.to_hex())
}

pub fn snapshot_key(anchor: &CommitId) -> String {
    format!("{SNAPSHOT_PREFIX}{}", anchor.to_hex())
}

pub fn segment_key(id: &ObjectId) -> String {
    format!("{SEGMENT_PREFIX}{}", id.to_hex())
}

pub fn ref_key(name: &str) -> String {
    format!("{REF_PREFIX}{name}")
}

/// Recover the commit id from a `commit/<hex>` key.
pub fn commit_id_from_key(key: &str) -> Option<CommitId> {
    key.strip_prefix(COMMIT_PREFIX)
        .and_then(|hex| CommitId::from_hex(hex).ok())
}
