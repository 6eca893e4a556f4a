pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;
pub mod types;

pub use backends::{DiskBlobStore, DiskBlobStoreBuilder, MemoryBlobStore, TestBlobStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError, ValidationError};
pub use r#trait::BlobStore;
pub use types::MessageKey;
