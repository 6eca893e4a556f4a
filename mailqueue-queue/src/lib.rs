//! Durable enqueueing of outbound mail
//!
//! A message is stored once in a content-addressed [`BlobStore`], then fanned
//! out into one [`QueueEntry`] per envelope recipient, each announced on the
//! [`NotificationBus`] for the delivery workers. [`Remover`] is the inverse:
//! it drops one entry and garbage-collects the blob once nothing references
//! it.
//!
//! [`BlobStore`]: mailqueue_store::BlobStore

pub mod bus;
pub mod context;
pub mod enqueue;
pub mod entry;
pub mod error;
pub mod records;
pub mod remove;

pub use bus::{BusConfig, MemoryBus, NotificationBus, NsqBus, REMOTE_DELIVERY_TOPIC, TestBus};
pub use context::QueueContext;
pub use enqueue::Enqueuer;
pub use entry::QueueEntry;
pub use error::{PublishError, QueueError, RecordError};
pub use records::{MemoryRecordStore, RecordStore, RecordsConfig, SqliteRecordStore, TestRecordStore};
pub use remove::Remover;
