use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::error::{BackendError, BackendResult};
use crate::item::{Expected, Item, ScanPage, WriteOutcome};
use crate::traits::Backend;

/// Gives every call on the wrapped backend its own timeout.
///
/// A call that exceeds the timeout returns [`BackendError::Timeout`]. For
/// writes this means the outcome is unknown: the backend may still apply
/// the write after the caller gave up.
pub struct TimedBackend<B> {
    inner: B,
    timeout: Duration,
}

impl<B: Backend> TimedBackend<B> {
    pub fn new(inner: B, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "backend call timed out");
                Err(BackendError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for TimedBackend<B> {
    async fn get_item(&self, key: &str) -> BackendResult<Option<Item>> {
        self.timed("get_item", self.inner.get_item(key)).await
    }

    async fn put_item(&self, key: &str, value: Bytes) -> BackendResult<()> {
        self.timed("put_item", self.inner.put_item(key, value)).await
    }

    async fn conditional_put_item(
        &self,
        key: &str,
        expected: Expected,
        item: Item,
    ) -> BackendResult<WriteOutcome> {
        self.timed(
            "conditional_put_item",
            self.inner.conditional_put_item(key, expected, item),
        )
        .await
    }

    async fn conditional_delete_item(
        &self,
        key: &str,
        expected_version: u64,
    ) -> BackendResult<WriteOutcome> {
        self.timed(
            "conditional_delete_item",
            self.inner.conditional_delete_item(key, expected_version),
        )
        .await
    }

    async fn delete_item(&self, key: &str) -> BackendResult<bool> {
        self.timed("delete_item", self.inner.delete_item(key)).await
    }

    async fn batch_get_items(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
        self.timed("batch_get_items", self.inner.batch_get_items(keys))
            .await
    }

    async fn scan_keys(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> BackendResult<ScanPage> {
        self.timed("scan_keys", self.inner.scan_keys(prefix, start_after, limit))
            .await
    }
}
