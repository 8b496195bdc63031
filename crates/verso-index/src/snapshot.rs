//! Segmented snapshot persistence.
//!
//! A snapshot is written as a header item keyed by its anchor commit plus a
//! list of content-addressed segment items, each holding a sorted run of at
//! most `segment_size` index entries. Segments are written before the
//! header, so a readable header always references segments that were
//! written.
//!
//! Segments are shared between snapshots, and the collector may delete one
//! that only a dead snapshot appeared to use while a writer is between its
//! segment and header writes. The writer re-checks its segments once the
//! header is in place and the collector re-checks after deleting; whichever
//! runs second puts the segment back.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use verso_backend::keys::{segment_key, snapshot_key};
use verso_backend::{codec, Backend, Expected, Item};
use verso_crypto::ContentHasher;
use verso_types::{CommitId, ContentKey, ObjectId};

use crate::entry::{ContentIndex, IndexEntry};
use crate::error::{IndexError, IndexResult};

/// Reference from a header to one segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub id: ObjectId,
    pub first_key: ContentKey,
    pub last_key: ContentKey,
}

/// The header of a snapshot anchored at one commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub anchor: CommitId,
    pub anchor_depth: u64,
    pub entry_count: u64,
    pub segments: Vec<SegmentRef>,
}

impl SnapshotHeader {
    /// Segments that may contain `key`.
    pub fn segments_for<'a>(
        &'a self,
        key: &'a ContentKey,
    ) -> impl Iterator<Item = &'a SegmentRef> + 'a {
        self.segments
            .iter()
            .filter(move |s| &s.first_key <= key && key <= &s.last_key)
    }
}

/// A sorted run of index entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSegment {
    pub entries: Vec<(ContentKey, IndexEntry)>,
}

/// Reads and writes snapshots over a [`Backend`].
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn Backend>,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Persist `index` as the snapshot anchored at `anchor`.
    ///
    /// Writing a snapshot that already exists is a no-op: materialization is
    /// deterministic, so any two snapshots of the same commit are equal.
    pub async fn write(
        &self,
        anchor: CommitId,
        anchor_depth: u64,
        index: &ContentIndex,
        segment_size: usize,
    ) -> IndexResult<SnapshotHeader> {
        let segment_size = segment_size.max(1);
        let entries: Vec<(ContentKey, IndexEntry)> =
            index.iter().map(|(k, e)| (k.clone(), *e)).collect();

        let mut segments = Vec::with_capacity(entries.len().div_ceil(segment_size));
        let mut written = Vec::with_capacity(segments.capacity());
        for chunk in entries.chunks(segment_size) {
            let segment = SnapshotSegment {
                entries: chunk.to_vec(),
            };
            let bytes = Bytes::from(codec::encode(&segment)?);
            let id = ContentHasher::SEGMENT.hash(&bytes);
            self.backend.put_item(&segment_key(&id), bytes.clone()).await?;
            written.push((id, bytes));
            // `chunks` never yields an empty slice.
            let (first_key, _) = &chunk[0];
            let (last_key, _) = &chunk[chunk.len() - 1];
            segments.push(SegmentRef {
                id,
                first_key: first_key.clone(),
                last_key: last_key.clone(),
            });
        }

        let header = SnapshotHeader {
            anchor,
            anchor_depth,
            entry_count: entries.len() as u64,
            segments,
        };
        let bytes = codec::encode(&header)?;
        let outcome = self
            .backend
            .conditional_put_item(&snapshot_key(&anchor), Expected::Absent, Item::new(bytes, 0))
            .await?;
        let restored = self.restore_missing(anchor, &written).await?;
        debug!(
            anchor = %anchor.short_hex(),
            entries = header.entry_count,
            segments = header.segments.len(),
            restored,
            created = outcome.is_applied(),
            "wrote snapshot"
        );
        Ok(header)
    }

    /// Put back any of `segments` that are no longer stored.
    async fn restore_missing(
        &self,
        anchor: CommitId,
        segments: &[(ObjectId, Bytes)],
    ) -> IndexResult<usize> {
        if segments.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = segments.iter().map(|(id, _)| segment_key(id)).collect();
        let present = self.backend.batch_get_items(&keys).await?;
        let mut restored = 0;
        for ((id, bytes), key) in segments.iter().zip(keys.iter()) {
            if !present.contains_key(key) {
                warn!(anchor = %anchor.short_hex(), segment = %id.short_hex(), "restoring collected segment");
                self.backend.put_item(key, bytes.clone()).await?;
                restored += 1;
            }
        }
        Ok(restored)
    }

    /// Read the header anchored at `anchor`, if any.
    pub async fn header(&self, anchor: &CommitId) -> IndexResult<Option<SnapshotHeader>> {
        match self.backend.get_item(&snapshot_key(anchor)).await? {
            Some(item) => Ok(Some(decode_header(*anchor, &item.value)?)),
            None => Ok(None),
        }
    }

    /// Read the headers anchored at any of `anchors` in one batch.
    pub async fn headers(
        &self,
        anchors: &[CommitId],
    ) -> IndexResult<HashMap<CommitId, SnapshotHeader>> {
        let wanted: Vec<CommitId> = anchors
            .iter()
            .filter(|a| !a.is_no_ancestor())
            .copied()
            .collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = wanted.iter().map(snapshot_key).collect();
        let mut items = self.backend.batch_get_items(&keys).await?;
        let mut found = HashMap::new();
        for (anchor, key) in wanted.iter().zip(keys.iter()) {
            if let Some(item) = items.remove(key) {
                found.insert(*anchor, decode_header(*anchor, &item.value)?);
            }
        }
        Ok(found)
    }

    /// Load the full index described by `header`.
    pub async fn load(&self, header: &SnapshotHeader) -> IndexResult<ContentIndex> {
        let segments = self.load_segments(header, header.segments.iter()).await?;
        let mut entries = BTreeMap::new();
        for segment in segments {
            entries.extend(segment.entries);
        }
        if entries.len() as u64 != header.entry_count {
            return Err(IndexError::CorruptSnapshot {
                anchor: header.anchor,
                reason: format!(
                    "header lists {} entries, segments hold {}",
                    header.entry_count,
                    entries.len()
                ),
            });
        }
        Ok(ContentIndex::from_entries(entries))
    }

    /// Resolve only `keys` from the snapshot, reading just the segments whose
    /// key range covers them. Keys absent from the snapshot map to `None`.
    pub async fn lookup(
        &self,
        header: &SnapshotHeader,
        keys: &[ContentKey],
    ) -> IndexResult<BTreeMap<ContentKey, Option<IndexEntry>>> {
        let mut refs: Vec<&SegmentRef> = keys.iter().flat_map(|k| header.segments_for(k)).collect();
        refs.sort_by_key(|r| r.id);
        refs.dedup_by_key(|r| r.id);

        let segments = self.load_segments(header, refs.into_iter()).await?;
        let mut found: HashMap<&ContentKey, IndexEntry> = HashMap::new();
        for segment in &segments {
            for (key, entry) in &segment.entries {
                found.insert(key, *entry);
            }
        }
        Ok(keys
            .iter()
            .map(|k| (k.clone(), found.get(k).copied()))
            .collect())
    }

    /// Delete the header anchored at `anchor`. Segments are left for the
    /// collector, since other snapshots may share them.
    pub async fn delete_header(&self, anchor: &CommitId) -> IndexResult<bool> {
        Ok(self.backend.delete_item(&snapshot_key(anchor)).await?)
    }

    /// Delete one segment. Returns its bytes if this call removed it, so the
    /// caller can put it back should a new snapshot turn out to use it.
    pub async fn delete_segment(&self, id: &ObjectId) -> IndexResult<Option<Bytes>> {
        let key = segment_key(id);
        let Some(item) = self.backend.get_item(&key).await? else {
            return Ok(None);
        };
        if self.backend.delete_item(&key).await? {
            Ok(Some(item.value))
        } else {
            Ok(None)
        }
    }

    /// Store segment bytes previously returned by [`Self::delete_segment`].
    pub async fn restore_segment(&self, id: &ObjectId, bytes: Bytes) -> IndexResult<()> {
        Ok(self.backend.put_item(&segment_key(id), bytes).await?)
    }

    async fn load_segments<'a>(
        &self,
        header: &SnapshotHeader,
        refs: impl Iterator<Item = &'a SegmentRef>,
    ) -> IndexResult<Vec<SnapshotSegment>> {
        let ids: Vec<ObjectId> = refs.map(|r| r.id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(segment_key).collect();
        let mut items = self.backend.batch_get_items(&keys).await?;

        let mut segments = Vec::with_capacity(ids.len());
        for (id, key) in ids.iter().zip(keys.iter()) {
            let corrupt = |reason: String| IndexError::CorruptSnapshot {
                anchor: header.anchor,
                reason,
            };
            let item = items
                .remove(key)
                .ok_or_else(|| corrupt(format!("segment {} is missing", id.short_hex())))?;
            if !ContentHasher::SEGMENT.verify(&item.value, id) {
                return Err(corrupt(format!("segment {} fails its hash", id.short_hex())));
            }
            let segment: SnapshotSegment = codec::decode(&item.value)
                .map_err(|e| corrupt(format!("segment {}: {e}", id.short_hex())))?;
            segments.push(segment);
        }
        Ok(segments)
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}

fn decode_header(anchor: CommitId, data: &[u8]) -> IndexResult<SnapshotHeader> {
    let header: SnapshotHeader =
        codec::decode(data).map_err(|e| IndexError::CorruptSnapshot {
            anchor,
            reason: format!("undecodable header: {e}"),
        })?;
    if header.anchor != anchor {
        return Err(IndexError::CorruptSnapshot {
            anchor,
            reason: format!("header names anchor {}", header.anchor),
        });
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::IndexDelta;
    use verso_backend::InMemoryBackend;
    use verso_types::ContentPointer;

    fn index_of(n: usize) -> ContentIndex {
        let mut delta = IndexDelta::default();
        for i in 0..n {
            delta.added.insert(
                ContentKey::parse(&format!("k{i:03}")).unwrap(),
                ContentPointer::new(ObjectId::from_bytes(format!("v{i}").as_bytes())),
            );
        }
        let mut index = ContentIndex::new();
        index.apply(anchor(), &delta);
        index
    }

    fn anchor() -> CommitId {
        CommitId::new(ObjectId::from_bytes(b"anchor"))
    }

    #[tokio::test]
    async fn write_then_load() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(backend.clone());
        let index = index_of(25);

        let header = store.write(anchor(), 7, &index, 10).await.unwrap();
        assert_eq!(header.segments.len(), 3);
        assert_eq!(header.entry_count, 25);
        assert_eq!(header.anchor_depth, 7);

        let read_header = store.header(&anchor()).await.unwrap().unwrap();
        assert_eq!(read_header, header);
        assert_eq!(store.load(&read_header).await.unwrap(), index);
    }

    #[tokio::test]
    async fn empty_index_has_no_segments() {
        let store = SnapshotStore::new(Arc::new(InMemoryBackend::new()));
        let header = store.write(anchor(), 1, &ContentIndex::new(), 10).await.unwrap();
        assert!(header.segments.is_empty());
        assert!(store.load(&header).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewriting_is_a_noop() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(backend.clone());
        let index = index_of(5);
        store.write(anchor(), 1, &index, 2).await.unwrap();
        let items = backend.len();
        store.write(anchor(), 1, &index, 2).await.unwrap();
        assert_eq!(backend.len(), items);
    }

    #[tokio::test]
    async fn lookup_reads_only_covering_segments() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(backend.clone());
        let header = store.write(anchor(), 1, &index_of(30), 10).await.unwrap();

        let wanted = vec![
            ContentKey::parse("k005").unwrap(),
            ContentKey::parse("k007").unwrap(),
            ContentKey::parse("zzz").unwrap(),
        ];
        let found = store.lookup(&header, &wanted).await.unwrap();
        assert!(found[&wanted[0]].is_some());
        assert!(found[&wanted[1]].is_some());
        assert!(found[&wanted[2]].is_none());
    }

    #[tokio::test]
    async fn missing_segment_is_corruption() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(backend.clone());
        let header = store.write(anchor(), 1, &index_of(4), 2).await.unwrap();
        store.delete_segment(&header.segments[0].id).await.unwrap();
        assert!(matches!(
            store.load(&header).await,
            Err(IndexError::CorruptSnapshot { .. })
        ));
    }

    #[tokio::test]
    async fn rewriting_restores_collected_segments() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(backend.clone());
        let index = index_of(4);
        let header = store.write(anchor(), 1, &index, 2).await.unwrap();
        let taken = store.delete_segment(&header.segments[1].id).await.unwrap();
        assert!(taken.is_some());
        assert!(store.delete_segment(&header.segments[1].id).await.unwrap().is_none());

        store.write(anchor(), 1, &index, 2).await.unwrap();
        assert_eq!(store.load(&header).await.unwrap(), index);
    }

    #[tokio::test]
    async fn tampered_segment_is_corruption() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(backend.clone());
        let header = store.write(anchor(), 1, &index_of(4), 2).await.unwrap();
        backend.tamper(&segment_key(&header.segments[1].id), b"junk".to_vec());
        assert!(matches!(
            store.load(&header).await,
            Err(IndexError::CorruptSnapshot { .. })
        ));
    }

    #[tokio::test]
    async fn batch_headers() {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(backend.clone());
        store.write(anchor(), 1, &index_of(1), 2).await.unwrap();
        let other = CommitId::new(ObjectId::from_bytes(b"other"));
        let found = store
            .headers(&[anchor(), other, CommitId::NO_ANCESTOR])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&anchor()));
        assert!(store.delete_header(&anchor()).await.unwrap());
        assert!(store.header(&anchor()).await.unwrap().is_none());
    }
}
