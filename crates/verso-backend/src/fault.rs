//! Scripted failures for exercising the commit protocol.
//!
//! [`FaultInjectingBackend`] wraps another backend and, following a
//! [`FaultPlan`], fails calls, loses conditional-write acknowledgements, or
//! forces conditional writes to lose as if another writer got there first.
//! CAS faults only hit reference updates: writes under [`REF_PREFIX`]
//! guarded by [`Expected::Version`]. Creations and other keys are left alone.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::item::{Expected, Item, ScanPage, WriteOutcome};
use crate::keys::REF_PREFIX;
use crate::traits::Backend;

/// What to inject next. Counters are consumed as faults fire.
#[derive(Clone, Debug, Default)]
pub struct FaultPlan {
    /// Fail the next N calls of any kind with [`BackendError::Unavailable`].
    pub fail_next: u32,
    /// Report the next N reference updates as `ConditionFailed` without
    /// applying them.
    pub cas_conflicts: u32,
    /// Apply the next N reference updates, then report a timeout.
    pub lost_acks: u32,
    /// Fail every write to a key with this prefix.
    pub fail_writes_with_prefix: Option<String>,
    /// Sleep this long before serving each call.
    pub delay: Option<Duration>,
}

/// Backend wrapper that injects faults according to a [`FaultPlan`].
pub struct FaultInjectingBackend<B> {
    inner: B,
    plan: Mutex<FaultPlan>,
    injected: Mutex<u64>,
}

impl<B: Backend> FaultInjectingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            plan: Mutex::new(FaultPlan::default()),
            injected: Mutex::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Replace the current plan.
    pub fn set_plan(&self, plan: FaultPlan) {
        if let Ok(mut current) = self.plan.lock() {
            *current = plan;
        }
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> u64 {
        self.injected.lock().map(|n| *n).unwrap_or(0)
    }

    fn record(&self, what: &str, key: &str) {
        debug!(fault = what, key, "injecting backend fault");
        if let Ok(mut n) = self.injected.lock() {
            *n += 1;
        }
    }

    async fn before_call(&self, operation: &'static str, key: &str) -> BackendResult<()> {
        let (delay, fail) = {
            let mut plan = self
                .plan
                .lock()
                .map_err(|e| BackendError::Unavailable(format!("lock poisoned: {e}")))?;
            let fail = if plan.fail_next > 0 {
                plan.fail_next -= 1;
                true
            } else {
                false
            };
            (plan.delay, fail)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            self.record("unavailable", key);
            return Err(BackendError::Unavailable(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }

    fn write_blocked(&self, key: &str) -> BackendResult<()> {
        let blocked = self
            .plan
            .lock()
            .map(|plan| {
                plan.fail_writes_with_prefix
                    .as_deref()
                    .is_some_and(|prefix| key.starts_with(prefix))
            })
            .unwrap_or(false);
        if blocked {
            self.record("blocked-write", key);
            return Err(BackendError::Unavailable(format!(
                "injected write failure for {key}"
            )));
        }
        Ok(())
    }

    fn take_cas_fault(&self) -> Option<&'static str> {
        let mut plan = self.plan.lock().ok()?;
        if plan.cas_conflicts > 0 {
            plan.cas_conflicts -= 1;
            Some("cas-conflict")
        } else if plan.lost_acks > 0 {
            plan.lost_acks -= 1;
            Some("lost-ack")
        } else {
            None
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for FaultInjectingBackend<B> {
    async fn get_item(&self, key: &str) -> BackendResult<Option<Item>> {
        self.before_call("get_item", key).await?;
        self.inner.get_item(key).await
    }

    async fn put_item(&self, key: &str, value: Bytes) -> BackendResult<()> {
        self.before_call("put_item", key).await?;
        self.write_blocked(key)?;
        self.inner.put_item(key, value).await
    }

    async fn conditional_put_item(
        &self,
        key: &str,
        expected: Expected,
        item: Item,
    ) -> BackendResult<WriteOutcome> {
        self.before_call("conditional_put_item", key).await?;
        self.write_blocked(key)?;
        let fault = match expected {
            Expected::Version(_) if key.starts_with(REF_PREFIX) => self.take_cas_fault(),
            _ => None,
        };
        match fault {
            Some("cas-conflict") => {
                self.record("cas-conflict", key);
                Ok(WriteOutcome::ConditionFailed)
            }
            Some(_) => {
                self.record("lost-ack", key);
                self.inner.conditional_put_item(key, expected, item).await?;
                Err(BackendError::Timeout {
                    operation: "conditional_put_item",
                    after: Duration::ZERO,
                })
            }
            None => self.inner.conditional_put_item(key, expected, item).await,
        }
    }

    async fn conditional_delete_item(
        &self,
        key: &str,
        expected_version: u64,
    ) -> BackendResult<WriteOutcome> {
        self.before_call("conditional_delete_item", key).await?;
        self.write_blocked(key)?;
        self.inner.conditional_delete_item(key, expected_version).await
    }

    async fn delete_item(&self, key: &str) -> BackendResult<bool> {
        self.before_call("delete_item", key).await?;
        self.write_blocked(key)?;
        self.inner.delete_item(key).await
    }

    async fn batch_get_items(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
        let first = keys.first().map(String::as_str).unwrap_or("");
        self.before_call("batch_get_items", first).await?;
        self.inner.batch_get_items(keys).await
    }

    async fn scan_keys(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> BackendResult<ScanPage> {
        self.before_call("scan_keys", prefix).await?;
        self.inner.scan_keys(prefix, start_after, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn faulty() -> FaultInjectingBackend<InMemoryBackend> {
        FaultInjectingBackend::new(InMemoryBackend::new())
    }

    #[tokio::test]
    async fn fail_next_is_consumed() {
        let backend = faulty();
        backend.set_plan(FaultPlan {
            fail_next: 2,
            ..FaultPlan::default()
        });
        assert!(backend.get_item("k").await.is_err());
        assert!(backend.get_item("k").await.is_err());
        assert!(backend.get_item("k").await.is_ok());
        assert_eq!(backend.injected(), 2);
    }

    #[tokio::test]
    async fn cas_conflict_does_not_apply() {
        let backend = faulty();
        backend
            .conditional_put_item("ref/r", Expected::Absent, Item::new(Bytes::from_static(b"x"), 1))
            .await
            .unwrap();
        backend.set_plan(FaultPlan {
            cas_conflicts: 1,
            ..FaultPlan::default()
        });
        let outcome = backend
            .conditional_put_item("ref/r", Expected::Version(1), Item::new(Bytes::from_static(b"y"), 2))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::ConditionFailed);
        let stored = backend.inner().get_item("ref/r").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn only_reference_updates_are_faulted() {
        let backend = faulty();
        backend.set_plan(FaultPlan {
            cas_conflicts: 1,
            ..FaultPlan::default()
        });
        let outcome = backend
            .conditional_put_item("ref/c", Expected::Absent, Item::new(Bytes::from_static(b"x"), 1))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        backend
            .conditional_put_item("commit/c", Expected::Absent, Item::new(Bytes::from_static(b"x"), 1))
            .await
            .unwrap();
        let outcome = backend
            .conditional_put_item("commit/c", Expected::Version(1), Item::new(Bytes::from_static(b"x"), 2))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        assert_eq!(backend.injected(), 0);

        let outcome = backend
            .conditional_put_item("ref/c", Expected::Version(1), Item::new(Bytes::from_static(b"y"), 2))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::ConditionFailed);
        assert_eq!(backend.injected(), 1);
    }

    #[tokio::test]
    async fn lost_ack_applies_then_times_out() {
        let backend = faulty();
        backend
            .conditional_put_item("ref/r", Expected::Absent, Item::new(Bytes::from_static(b"x"), 1))
            .await
            .unwrap();
        backend.set_plan(FaultPlan {
            lost_acks: 1,
            ..FaultPlan::default()
        });
        let err = backend
            .conditional_put_item("ref/r", Expected::Version(1), Item::new(Bytes::from_static(b"y"), 2))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        let stored = backend.inner().get_item("ref/r").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn blocked_prefix_rejects_writes_only() {
        let backend = faulty();
        backend.set_plan(FaultPlan {
            fail_writes_with_prefix: Some("snapshot/".into()),
            ..FaultPlan::default()
        });
        assert!(backend
            .put_item("snapshot/1", Bytes::from_static(b"x"))
            .await
            .is_err());
        assert!(backend
            .put_item("commit/1", Bytes::from_static(b"x"))
            .await
            .is_ok());
        assert!(backend.get_item("snapshot/1").await.unwrap().is_none());
    }
}
