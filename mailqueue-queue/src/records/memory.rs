use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use mailqueue_store::{BlobStore, MessageKey};
use tokio::sync::Mutex;

use crate::{QueueEntry, QueueError, RecordError, records::RecordStore};

/// In-memory record store
///
/// Ids come from a shared sequence starting at 1. Clones share the map, the
/// sequence, the pins and the write lock, so every clone sees one store.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    pub(crate) entries: Arc<DashMap<i64, QueueEntry>>,
    pins: Arc<DashMap<MessageKey, u64>>,
    next_id: Arc<AtomicI64>,
    /// Held by `pin` and across the whole of `delete_unreferenced`
    write_lock: Arc<Mutex<()>>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            pins: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Enqueues currently holding a pin on `key`
    #[must_use]
    pub fn pinned(&self, key: &MessageKey) -> u64 {
        self.pins.get(key).map_or(0, |pins| *pins)
    }

    /// Delete and count through `steps`, then collect the blob, all under
    /// this store's write lock
    ///
    /// `steps` is normally `self`; wrappers pass themselves so their own
    /// `delete` and `count_by_key` take part.
    pub(crate) async fn delete_unreferenced_via(
        &self,
        steps: &dyn RecordStore,
        entry: &QueueEntry,
        blobs: &dyn BlobStore,
    ) -> Result<u64, QueueError> {
        let _guard = self.write_lock.lock().await;

        steps.delete(entry).await?;
        let remaining = steps.count_by_key(&entry.key).await? + self.pinned(&entry.key);

        if remaining == 0 {
            blobs.del(&entry.key).await?;
        }

        Ok(remaining)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every stored entry, ordered by id
    #[must_use]
    pub fn entries(&self) -> Vec<QueueEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, entry: &mut QueueEntry) -> Result<(), RecordError> {
        entry.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn delete(&self, entry: &QueueEntry) -> Result<(), RecordError> {
        self.entries
            .remove(&entry.id)
            .map(|_| ())
            .ok_or(RecordError::NotFound(entry.id))
    }

    async fn count_by_key(&self, key: &MessageKey) -> Result<u64, RecordError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| &entry.value().key == key)
            .count() as u64)
    }

    async fn get(&self, id: i64) -> Result<QueueEntry, RecordError> {
        self.entries
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(RecordError::NotFound(id))
    }

    async fn pin(&self, key: &MessageKey) -> Result<(), RecordError> {
        let _guard = self.write_lock.lock().await;
        *self.pins.entry(key.clone()).or_default() += 1;
        Ok(())
    }

    async fn unpin(&self, key: &MessageKey) -> Result<(), RecordError> {
        if let Entry::Occupied(mut pins) = self.pins.entry(key.clone()) {
            if *pins.get() <= 1 {
                pins.remove();
            } else {
                *pins.get_mut() -= 1;
            }
        }
        Ok(())
    }

    async fn delete_unreferenced(
        &self,
        entry: &QueueEntry,
        blobs: &dyn BlobStore,
    ) -> Result<u64, QueueError> {
        self.delete_unreferenced_via(self, entry, blobs).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mailqueue_common::Address;
    use mailqueue_store::MemoryBlobStore;

    use super::*;

    fn entry(body: &[u8], rcpt: &str) -> QueueEntry {
        let rcpt: Address = rcpt.parse().unwrap();
        QueueEntry::new(
            MessageKey::digest(body),
            "from@example.com".to_string(),
            "from@example.com".to_string(),
            &rcpt,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_ids_are_assigned_in_sequence() {
        let store = MemoryRecordStore::new();
        let mut first = entry(b"m", "a@x.com");
        let mut second = entry(b"m", "b@x.com");

        store.create(&mut first).await.unwrap();
        store.create(&mut second).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.get(2).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_count_by_key() {
        let store = MemoryRecordStore::new();
        for (body, rcpt) in [(&b"one"[..], "a@x.com"), (b"one", "b@x.com"), (b"two", "c@x.com")] {
            store.create(&mut entry(body, rcpt)).await.unwrap();
        }

        assert_eq!(store.count_by_key(&MessageKey::digest(b"one")).await.unwrap(), 2);
        assert_eq!(store.count_by_key(&MessageKey::digest(b"two")).await.unwrap(), 1);
        assert_eq!(store.count_by_key(&MessageKey::digest(b"three")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pins_count_as_references() {
        let store = MemoryRecordStore::new();
        let blobs = MemoryBlobStore::new();
        let key = MessageKey::digest(b"m");
        blobs.put(&key, b"m").await.unwrap();

        let mut first = entry(b"m", "a@x.com");
        let mut second = entry(b"m", "b@x.com");
        store.create(&mut first).await.unwrap();
        store.create(&mut second).await.unwrap();

        store.pin(&key).await.unwrap();
        assert_eq!(store.pinned(&key), 1);

        assert_eq!(store.delete_unreferenced(&first, &blobs).await.unwrap(), 2);
        assert_eq!(store.delete_unreferenced(&second, &blobs).await.unwrap(), 1);
        assert!(blobs.contains(&key));

        store.unpin(&key).await.unwrap();
        assert_eq!(store.pinned(&key), 0);
        assert!(store.pins.is_empty());
    }

    #[tokio::test]
    async fn test_last_reference_collects_blob() {
        let store = MemoryRecordStore::new();
        let blobs = MemoryBlobStore::new();
        let key = MessageKey::digest(b"m");
        blobs.put(&key, b"m").await.unwrap();

        let mut only = entry(b"m", "a@x.com");
        store.create(&mut only).await.unwrap();

        assert_eq!(store.delete_unreferenced(&only, &blobs).await.unwrap(), 0);
        assert!(!blobs.contains(&key));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unpin_without_pin_is_harmless() {
        let store = MemoryRecordStore::new();
        let key = MessageKey::digest(b"m");

        store.unpin(&key).await.unwrap();
        store.pin(&key).await.unwrap();
        store.pin(&key).await.unwrap();
        store.unpin(&key).await.unwrap();

        assert_eq!(store.pinned(&key), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryRecordStore::new();
        let mut e = entry(b"m", "a@x.com");
        store.create(&mut e).await.unwrap();

        store.delete(&e).await.unwrap();
        assert!(matches!(
            store.delete(&e).await,
            Err(RecordError::NotFound(1))
        ));
        assert!(store.is_empty());
    }
}
