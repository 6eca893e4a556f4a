use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use mailqueue_store::{BlobStore, MessageKey};

use super::memory::MemoryRecordStore;
use crate::{QueueEntry, QueueError, RecordError, records::RecordStore};

/// Testing wrapper around [`MemoryRecordStore`]
///
/// Can fail the n-th `create` (1-based, counted across the store's life),
/// every `delete`, or every `count_by_key`. Injected failures also apply
/// inside `delete_unreferenced`.
#[derive(Debug, Clone, Default)]
pub struct TestRecordStore {
    pub(crate) inner: MemoryRecordStore,
    creates: Arc<AtomicUsize>,
    fail_create_at: Arc<AtomicUsize>,
    fail_delete: Arc<AtomicBool>,
    fail_count: Arc<AtomicBool>,
}

impl TestRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th call to `create`; 0 disables
    pub fn fail_create_at(&self, n: usize) {
        self.fail_create_at.store(n, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_counts(&self, fail: bool) {
        self.fail_count.store(fail, Ordering::SeqCst);
    }

    /// Number of `create` calls seen, including failed ones
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Every stored entry, ordered by id
    #[must_use]
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.inner.entries()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Enqueues currently holding a pin on `key`
    #[must_use]
    pub fn pinned(&self, key: &MessageKey) -> u64 {
        self.inner.pinned(key)
    }
}

#[async_trait]
impl RecordStore for TestRecordStore {
    async fn create(&self, entry: &mut QueueEntry) -> Result<(), RecordError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_create_at.load(Ordering::SeqCst) {
            return Err(RecordError::Injected("create"));
        }
        self.inner.create(entry).await
    }

    async fn delete(&self, entry: &QueueEntry) -> Result<(), RecordError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(RecordError::Injected("delete"));
        }
        self.inner.delete(entry).await
    }

    async fn count_by_key(&self, key: &MessageKey) -> Result<u64, RecordError> {
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(RecordError::Injected("count"));
        }
        self.inner.count_by_key(key).await
    }

    async fn get(&self, id: i64) -> Result<QueueEntry, RecordError> {
        self.inner.get(id).await
    }

    async fn pin(&self, key: &MessageKey) -> Result<(), RecordError> {
        self.inner.pin(key).await
    }

    async fn unpin(&self, key: &MessageKey) -> Result<(), RecordError> {
        self.inner.unpin(key).await
    }

    async fn delete_unreferenced(
        &self,
        entry: &QueueEntry,
        blobs: &dyn BlobStore,
    ) -> Result<u64, QueueError> {
        self.inner.delete_unreferenced_via(self, entry, blobs).await
    }
}
