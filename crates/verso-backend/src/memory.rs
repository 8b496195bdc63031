use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{BackendError, BackendResult};
use crate::item::{Expected, Item, ScanPage, WriteOutcome};
use crate::traits::Backend;

/// Counters of calls served, by primitive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub gets: u64,
    pub batch_gets: u64,
    pub puts: u64,
    pub conditional_puts: u64,
    pub deletes: u64,
    pub scans: u64,
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    batch_gets: AtomicU64,
    puts: AtomicU64,
    conditional_puts: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
}

/// In-memory, `BTreeMap`-based backend.
///
/// Intended for tests and embedding. Items live behind a `RwLock`; each
/// conditional write holds the write lock for its compare and its swap, which
/// gives exactly the single-item atomicity a real backend provides and
/// nothing more.
pub struct InMemoryBackend {
    items: RwLock<BTreeMap<String, Item>>,
    counters: Counters,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            counters: Counters::default(),
        }
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    /// Returns `true` if no items are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.items
            .read()
            .map(|items| {
                items
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Overwrite an item's payload without touching its version.
    ///
    /// Simulates on-disk corruption in tests.
    pub fn tamper(&self, key: &str, value: impl Into<Bytes>) -> bool {
        match self.items.write() {
            Ok(mut items) => match items.get_mut(key) {
                Some(item) => {
                    item.value = value.into();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> BackendStats {
        let c = &self.counters;
        BackendStats {
            gets: c.gets.load(Ordering::Relaxed),
            batch_gets: c.batch_gets.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            conditional_puts: c.conditional_puts.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            scans: c.scans.load(Ordering::Relaxed),
        }
    }

    fn read(&self) -> BackendResult<RwLockReadGuard<'_, BTreeMap<String, Item>>> {
        self.items
            .read()
            .map_err(|e| BackendError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> BackendResult<RwLockWriteGuard<'_, BTreeMap<String, Item>>> {
        self.items
            .write()
            .map_err(|e| BackendError::Unavailable(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn get_item(&self, key: &str) -> BackendResult<Option<Item>> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.read()?.get(key).cloned())
    }

    async fn put_item(&self, key: &str, value: Bytes) -> BackendResult<()> {
        self.counters.puts.fetch_add(1, Ordering::Relaxed);
        self.write()?.insert(key.to_string(), Item::new(value, 0));
        Ok(())
    }

    async fn conditional_put_item(
        &self,
        key: &str,
        expected: Expected,
        item: Item,
    ) -> BackendResult<WriteOutcome> {
        self.counters.conditional_puts.fetch_add(1, Ordering::Relaxed);
        let mut items = self.write()?;
        let matches = match (expected, items.get(key)) {
            (Expected::Absent, None) => true,
            (Expected::Version(v), Some(current)) => current.version == v,
            _ => false,
        };
        if !matches {
            return Ok(WriteOutcome::ConditionFailed);
        }
        items.insert(key.to_string(), item);
        Ok(WriteOutcome::Applied)
    }

    async fn conditional_delete_item(
        &self,
        key: &str,
        expected_version: u64,
    ) -> BackendResult<WriteOutcome> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        let mut items = self.write()?;
        match items.get(key) {
            Some(current) if current.version == expected_version => {
                items.remove(key);
                Ok(WriteOutcome::Applied)
            }
            _ => Ok(WriteOutcome::ConditionFailed),
        }
    }

    async fn delete_item(&self, key: &str) -> BackendResult<bool> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.write()?.remove(key).is_some())
    }

    async fn batch_get_items(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
        self.counters.batch_gets.fetch_add(1, Ordering::Relaxed);
        let items = self.read()?;
        Ok(keys
            .iter()
            .filter_map(|k| items.get(k).map(|item| (k.clone(), item.clone())))
            .collect())
    }

    async fn scan_keys(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> BackendResult<ScanPage> {
        self.counters.scans.fetch_add(1, Ordering::Relaxed);
        let items = self.read()?;
        let lower = match start_after {
            Some(after) if after >= prefix => Bound::Excluded(after.to_string()),
            _ => Bound::Included(prefix.to_string()),
        };
        let mut keys: Vec<String> = items
            .range((lower, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .take(limit.saturating_add(1))
            .cloned()
            .collect();
        let next = if keys.len() > limit {
            keys.truncate(limit);
            keys.last().cloned()
        } else {
            None
        };
        Ok(ScanPage { keys, next })
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("item_count", &self.len())
            .finish()
    }
}
