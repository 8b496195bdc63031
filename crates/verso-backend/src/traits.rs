use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BackendResult;
use crate::item::{Expected, Item, ScanPage, WriteOutcome};

/// Single-item key-value backend.
///
/// All implementations must satisfy these invariants:
/// - `conditional_put_item` and `conditional_delete_item` are atomic for the
///   one item they touch. Nothing else is atomic.
/// - A successful write is visible to every subsequent read, from any
///   process.
/// - `batch_get_items` may omit keys that do not exist; it never reports a
///   missing key as an error.
/// - Transport failures are returned, never silently retried into success.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read one item. Returns `Ok(None)` if the key does not exist.
    async fn get_item(&self, key: &str) -> BackendResult<Option<Item>>;

    /// Unconditionally store `value` at version 0.
    ///
    /// Intended for content-addressed keys, where rewriting the same key
    /// always writes the same bytes.
    async fn put_item(&self, key: &str, value: Bytes) -> BackendResult<()>;

    /// Store `item` iff the stored state matches `expected`.
    async fn conditional_put_item(
        &self,
        key: &str,
        expected: Expected,
        item: Item,
    ) -> BackendResult<WriteOutcome>;

    /// Delete `key` iff it exists with `expected_version`.
    async fn conditional_delete_item(
        &self,
        key: &str,
        expected_version: u64,
    ) -> BackendResult<WriteOutcome>;

    /// Unconditionally delete `key`. Returns `true` if it existed.
    async fn delete_item(&self, key: &str) -> BackendResult<bool>;

    /// Read many items. Missing keys are absent from the result.
    ///
    /// The default implementation calls `get_item` for each key. Backends
    /// should override it with a native batch read.
    async fn batch_get_items(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = self.get_item(key).await? {
                found.insert(key.clone(), item);
            }
        }
        Ok(found)
    }

    /// List keys starting with `prefix`, in ascending order, strictly after
    /// `start_after`, at most `limit` per page.
    async fn scan_keys(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> BackendResult<ScanPage>;
}

#[async_trait]
impl<T: Backend + ?Sized> Backend for Arc<T> {
    async fn get_item(&self, key: &str) -> BackendResult<Option<Item>> {
        (**self).get_item(key).await
    }

    async fn put_item(&self, key: &str, value: Bytes) -> BackendResult<()> {
        (**self).put_item(key, value).await
    }

    async fn conditional_put_item(
        &self,
        key: &str,
        expected: Expected,
        item: Item,
    ) -> BackendResult<WriteOutcome> {
        (**self).conditional_put_item(key, expected, item).await
    }

    async fn conditional_delete_item(
        &self,
        key: &str,
        expected_version: u64,
    ) -> BackendResult<WriteOutcome> {
        (**self).conditional_delete_item(key, expected_version).await
    }

    async fn delete_item(&self, key: &str) -> BackendResult<bool> {
        (**self).delete_item(key).await
    }

    async fn batch_get_items(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
        (**self).batch_get_items(keys).await
    }

    async fn scan_keys(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> BackendResult<ScanPage> {
        (**self).scan_keys(prefix, start_after, limit).await
    }
}
