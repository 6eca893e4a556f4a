use std::sync::Arc;

use mailqueue_store::BlobStore;

use crate::{NotificationBus, RecordStore};

/// The external systems a queue operates on
///
/// Built once at start-up and handed to [`Enqueuer`](crate::Enqueuer) and
/// [`Remover`](crate::Remover). Clones share the same adapters. Enqueue and
/// remove coordinate through the [`RecordStore`], so separate contexts over
/// one store are as safe as clones of one context.
#[derive(Debug, Clone)]
pub struct QueueContext {
    pub(crate) store: Arc<dyn BlobStore>,
    pub(crate) records: Arc<dyn RecordStore>,
    pub(crate) bus: Arc<dyn NotificationBus>,
}

impl QueueContext {
    #[must_use]
    pub fn new(
        store: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        bus: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            store,
            records,
            bus,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    #[must_use]
    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<dyn NotificationBus> {
        &self.bus
    }
}
