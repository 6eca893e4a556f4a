//! Delivery record storage
//!
//! - `memory`: concurrent map, for tests and single-process deployments
//! - `sqlite`: durable table shared with delivery workers
//! - `test`: memory store with failure injection

pub mod memory;
pub mod sqlite;
pub mod test;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use mailqueue_store::{BlobStore, MessageKey};
use serde::Deserialize;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use test::TestRecordStore;

use crate::{QueueEntry, QueueError, RecordError};

/// Durable storage of queue entries
///
/// Each call must be atomic on its own: a create or delete is all or
/// nothing, and `count_by_key` reads a consistent snapshot.
///
/// # References
/// A blob is referenced by every entry carrying its key and by every pin on
/// that key. An enqueue pins its key before writing the blob and unpins it
/// once its entries exist, so the blob is never collected in between.
/// [`delete_unreferenced`](Self::delete_unreferenced) is the only place a
/// blob is collected, and it excludes `pin` for its whole duration. The
/// exclusion belongs to the store, so it holds across every process that
/// shares it.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Persist `entry`, assigning its `id`
    async fn create(&self, entry: &mut QueueEntry) -> Result<(), RecordError>;

    /// Remove the record with `entry.id`
    async fn delete(&self, entry: &QueueEntry) -> Result<(), RecordError>;

    /// Number of records referencing `key`
    async fn count_by_key(&self, key: &MessageKey) -> Result<u64, RecordError>;

    /// Load the record with this id
    async fn get(&self, id: i64) -> Result<QueueEntry, RecordError>;

    /// Mark `key` as referenced by an enqueue in progress
    async fn pin(&self, key: &MessageKey) -> Result<(), RecordError>;

    /// Release one earlier [`pin`](Self::pin) of `key`
    async fn unpin(&self, key: &MessageKey) -> Result<(), RecordError>;

    /// Remove `entry`, then delete its blob from `blobs` if nothing else
    /// references the key, returning the number of references left
    ///
    /// No `pin` of the key can complete between the count and the blob
    /// deletion. If the entry is deleted but the count fails, the entry
    /// stays deleted and the blob is kept.
    async fn delete_unreferenced(
        &self,
        entry: &QueueEntry,
        blobs: &dyn BlobStore,
    ) -> Result<u64, QueueError>;
}

/// Selects the record store driver
///
/// ```ron
/// records: Sqlite(
///     source: "/var/lib/mailqueue/queue.db",
/// ),
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum RecordsConfig {
    #[default]
    Memory,
    Sqlite {
        source: PathBuf,
    },
}

impl RecordsConfig {
    /// Open the configured store, creating the schema if needed
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated
    pub async fn into_record_store(self) -> Result<Arc<dyn RecordStore>, RecordError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryRecordStore::new())),
            Self::Sqlite { source } => Ok(Arc::new(SqliteRecordStore::open(source).await?)),
        }
    }
}
