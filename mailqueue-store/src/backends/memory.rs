use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{MessageKey, StoreError, r#trait::BlobStore};

/// In-memory blob store
///
/// Blobs live in a concurrent map keyed by [`MessageKey`]. Clones share the
/// same map, so a clone handed to another component sees every write.
///
/// # Capacity Management
/// An optional capacity caps the number of distinct blobs. Storing a new
/// key past the cap fails with [`StoreError::CapacityExceeded`]; overwriting
/// an existing key never does, since content-identical puts are routine.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    pub(crate) blobs: Arc<DashMap<MessageKey, Arc<[u8]>>>,
    capacity: Option<usize>,
}

impl MemoryBlobStore {
    /// Create a new empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store holding at most `capacity` blobs
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blobs: Arc::new(DashMap::new()),
            capacity: Some(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &MessageKey) -> bool {
        self.blobs.contains_key(key)
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &MessageKey, data: &[u8]) -> crate::Result<()> {
        if let Some(capacity) = self.capacity
            && !self.blobs.contains_key(key)
            && self.blobs.len() >= capacity
        {
            return Err(StoreError::CapacityExceeded {
                len: self.blobs.len(),
                capacity,
            });
        }

        self.blobs.insert(key.clone(), Arc::from(data));
        Ok(())
    }

    async fn get(&self, key: &MessageKey) -> crate::Result<Arc<[u8]>> {
        self.blobs
            .get(key)
            .map(|blob| Arc::clone(blob.value()))
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn del(&self, key: &MessageKey) -> crate::Result<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryBlobStore::new();
        let data = b"Subject: test\r\n\r\nbody\r\n";
        let key = MessageKey::digest(data);

        store.put(&key, data).await.expect("Failed to put");
        assert_eq!(store.len(), 1);

        let read = store.get(&key).await.expect("Failed to get");
        assert_eq!(read.as_ref(), data);

        store.del(&key).await.expect("Failed to delete");
        assert!(store.is_empty());
        assert!(matches!(
            store.get(&key).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryBlobStore::new();
        let key = MessageKey::digest(b"never stored");

        store.del(&key).await.expect("First delete");
        store.del(&key).await.expect("Second delete");
    }

    #[tokio::test]
    async fn test_identical_put_overwrites() {
        let store = MemoryBlobStore::new();
        let data = b"same bytes";
        let key = MessageKey::digest(data);

        store.put(&key, data).await.unwrap();
        store.put(&key, data).await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_capacity_limit() {
        let store = MemoryBlobStore::with_capacity(2);

        for body in [&b"one"[..], b"two"] {
            store.put(&MessageKey::digest(body), body).await.unwrap();
        }

        // Overwriting an existing key is fine at capacity
        store.put(&MessageKey::digest(b"one"), b"one").await.unwrap();

        let result = store.put(&MessageKey::digest(b"three"), b"three").await;
        assert!(matches!(
            result,
            Err(StoreError::CapacityExceeded {
                len: 2,
                capacity: 2
            })
        ));

        store.del(&MessageKey::digest(b"one")).await.unwrap();
        assert!(
            store
                .put(&MessageKey::digest(b"three"), b"three")
                .await
                .is_ok()
        );
    }
}
