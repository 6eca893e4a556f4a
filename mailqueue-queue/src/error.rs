//! Typed errors for queue operations.
//!
//! Each external collaborator has its own error type, and [`QueueError`]
//! wraps them so callers can tell which system failed:
//! - [`StoreError`]: the content store (blob put/get/delete)
//! - [`RecordError`]: the delivery record store (create/delete/count)
//! - [`PublishError`]: the notification bus
//! - [`AddressError`]: a malformed `Return-Path` header

use std::io;

use mailqueue_common::{address_parser::AddressError, error::MessageError};
use mailqueue_store::StoreError;
use thiserror::Error;

/// Failures of the delivery record store.
#[derive(Debug, Error)]
pub enum RecordError {
    /// No record with this id exists.
    #[error("Queue entry not found: {0}")]
    NotFound(i64),

    /// The underlying database rejected the operation.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be turned back into an entry.
    #[error("Invalid queue entry row: {0}")]
    InvalidRow(String),

    /// The blocking database task panicked or was cancelled.
    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Failure raised on purpose by a test store.
    #[error("Injected failure: {0}")]
    Injected(&'static str),
}

/// Failures of the notification bus.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Connection to the broker failed or broke.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The queue entry could not be encoded as a payload.
    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The broker answered with an error frame.
    #[error("Publish rejected by broker: {0}")]
    Rejected(String),

    /// The topic name is not acceptable to the broker.
    #[error("Invalid topic name: {0:?}")]
    InvalidTopic(String),

    /// The broker sent something that is not valid protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failure raised on purpose by a test bus.
    #[error("Injected failure: {0}")]
    Injected(&'static str),
}

/// Error returned by [`Enqueuer`](crate::Enqueuer) and [`Remover`](crate::Remover).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Content store error: {0}")]
    Store(#[from] StoreError),

    #[error("Record store error: {0}")]
    Record(#[from] RecordError),

    #[error("Notification error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid Return-Path: {0}")]
    AddressParse(#[from] AddressError),

    #[error("Invalid message: {0}")]
    Message(#[from] MessageError),

    /// The envelope names no recipients, so nothing would reference the blob.
    #[error("Envelope has no recipients")]
    NoRecipients,
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_queue_error_preserves_source() {
        let err = QueueError::from(RecordError::NotFound(7));

        assert_eq!(
            err.to_string(),
            "Record store error: Queue entry not found: 7"
        );
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("Queue entry not found: 7")
        );
        assert!(matches!(err, QueueError::Record(RecordError::NotFound(7))));
    }

    #[test]
    fn test_address_error_conversion() {
        let err = QueueError::from(AddressError::MissingAtSign);
        assert!(matches!(err, QueueError::AddressParse(_)));
        assert!(err.to_string().contains("Missing '@'"));
    }
}
