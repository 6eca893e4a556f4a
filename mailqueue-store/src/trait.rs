use std::sync::Arc;

use async_trait::async_trait;

use crate::MessageKey;

/// Content-addressed blob storage for raw messages
///
/// Implementations must make a single `put` atomic: a concurrent `get` sees
/// either nothing or the complete blob. Writing identical bytes under an
/// existing key is allowed and must leave the store unchanged.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Store `data` under `key`, replacing any existing blob
    async fn put(&self, key: &MessageKey, data: &[u8]) -> crate::Result<()>;

    /// Fetch the blob stored under `key`
    async fn get(&self, key: &MessageKey) -> crate::Result<Arc<[u8]>>;

    /// Remove the blob stored under `key`. Removing a missing key succeeds.
    async fn del(&self, key: &MessageKey) -> crate::Result<()>;
}
