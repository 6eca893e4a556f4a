use mailqueue_common::internal;

use crate::{QueueContext, QueueEntry, QueueError};

/// Removes delivered or abandoned entries from the queue
///
/// The blob is deleted together with the last entry that references it.
#[derive(Debug, Clone)]
pub struct Remover {
    ctx: QueueContext,
}

impl Remover {
    #[must_use]
    pub const fn new(ctx: QueueContext) -> Self {
        Self { ctx }
    }

    /// Delete `entry`, and its blob if no other entry uses it
    ///
    /// The record store runs the delete, the count and the blob deletion as
    /// one critical section, so an enqueue of the same content, from this
    /// process or any other sharing the store, either pins the key before
    /// the count or runs after the blob is gone and writes it again.
    ///
    /// # Errors
    /// Fails at the first step that fails, leaving the later steps undone:
    /// - [`QueueError::Record`] if the entry cannot be deleted or the
    ///   remaining entries cannot be counted (the blob is kept)
    /// - [`QueueError::Store`] if the blob cannot be deleted (the entry is
    ///   already gone)
    pub async fn delete(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let key = &entry.key;
        let remaining = self
            .ctx
            .records
            .delete_unreferenced(entry, self.ctx.store.as_ref())
            .await?;

        if remaining > 0 {
            internal!(
                level = DEBUG,
                "Removed entry {}, {remaining} more reference {key}",
                entry.id
            );
        } else {
            internal!(
                level = INFO,
                "Removed entry {} and its message {key}",
                entry.id
            );
        }

        Ok(())
    }

    /// Look up the entry with `id` and [`delete`](Self::delete) it
    ///
    /// # Errors
    /// As [`delete`](Self::delete), plus [`QueueError::Record`] if no such
    /// entry exists
    pub async fn delete_by_id(&self, id: i64) -> Result<QueueEntry, QueueError> {
        let entry = self.ctx.records.get(id).await?;
        self.delete(&entry).await?;
        Ok(entry)
    }
}
