//! Error types for the mailqueue-store crate.

use std::io;

use thiserror::Error;

use crate::MessageKey;

/// Top-level content store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No blob is stored under this key.
    #[error("Blob not found: {0}")]
    NotFound(MessageKey),

    /// Store directory validation failed.
    #[error("Store validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The store has reached its configured capacity.
    #[error("Store capacity exceeded: {len}/{capacity} blobs")]
    CapacityExceeded { len: usize, capacity: usize },

    /// Failure raised on purpose by a test store.
    #[error("Injected failure: {0}")]
    Injected(&'static str),
}

/// Store directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Store path contains a `..` component.
    #[error("Store path cannot contain '..' components: {0}")]
    ParentComponent(String),

    /// Store path is relative.
    #[error("Store path must be absolute: {0}")]
    NotAbsolute(String),

    /// Store path points into a protected system directory.
    #[error("Store path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: &'static str, path: String },

    /// Store path exists but is not a directory.
    #[error("Store path is not a directory: {0}")]
    NotDirectory(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
