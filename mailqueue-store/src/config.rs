use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{DiskBlobStore, MemoryBlobStore},
    r#trait::BlobStore,
};

/// Selects the blob store driver and its source
///
/// # Examples
///
/// Disk-backed store in RON config:
/// ```ron
/// store: Disk(
///     source: "/var/spool/mailqueue",
/// ),
/// ```
///
/// Memory-backed store with a capacity limit:
/// ```ron
/// store: Memory(
///     capacity: Some(1000),
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    /// One file per blob under `source`
    Disk { source: PathBuf },
    /// In-process map, lost on restart
    Memory {
        /// Maximum number of blobs to hold (omit for unlimited)
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Disk {
            source: DiskBlobStore::default().path().to_path_buf(),
        }
    }
}

impl StoreConfig {
    /// Name of the configured driver
    #[must_use]
    pub const fn driver(&self) -> &'static str {
        match self {
            Self::Disk { .. } => "disk",
            Self::Memory { .. } => "memory",
        }
    }

    /// Build the configured store
    ///
    /// Disk stores have their path validated and are initialised (directory
    /// created, stale temp files removed) before being returned.
    ///
    /// # Errors
    /// Returns an error if the disk path is rejected or cannot be initialised
    pub fn into_blob_store(self) -> crate::Result<Arc<dyn BlobStore>> {
        match self {
            Self::Disk { source } => {
                let mut store = DiskBlobStore::builder().path(source).build()?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory { capacity } => Ok(capacity.map_or_else(
                || Arc::new(MemoryBlobStore::new()) as Arc<dyn BlobStore>,
                |capacity| Arc::new(MemoryBlobStore::with_capacity(capacity)),
            )),
        }
    }
}
