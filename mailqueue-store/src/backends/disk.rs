use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use mailqueue_common::internal;
use tokio::fs;

use crate::{MessageKey, StoreError, ValidationError, r#trait::BlobStore};

const TEMP_PREFIX: &str = ".tmp_";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Disk-backed blob store
///
/// Each blob is a single file named after its [`MessageKey`] inside the
/// store directory. Since keys are validated hex digests, a key can never
/// name a file outside that directory.
///
/// # Atomicity
/// Writes go to a uniquely named `.tmp_` file first and are then renamed over
/// the final name. A reader therefore sees either the previous complete blob
/// or the new complete blob, never a partial one, and two concurrent puts of
/// the same content cannot corrupt each other. Temp files orphaned by a crash
/// are removed by [`DiskBlobStore::init`].
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    path: PathBuf,
}

impl Default for DiskBlobStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/mailqueue"),
        }
    }
}

impl DiskBlobStore {
    /// Validate a store directory
    ///
    /// # Security Checks
    /// - Rejects paths containing `..`
    /// - Requires an absolute path
    /// - Rejects sensitive system directories
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path
            .components()
            .any(|component| component == std::path::Component::ParentDir)
        {
            return Err(ValidationError::ParentComponent(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc",
            "/bin",
            "/sbin",
            "/usr/bin",
            "/usr/sbin",
            "/boot",
            "/sys",
            "/proc",
            "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .into_iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(ValidationError::SystemDirectory {
                prefix,
                path: path.display().to_string(),
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn builder() -> DiskBlobStoreBuilder {
        DiskBlobStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn blob_path(&self, key: &MessageKey) -> PathBuf {
        self.path.join(key.as_str())
    }

    /// Prepare the store directory
    ///
    /// Creates the directory if needed, checks it really is a directory and
    /// removes temp files left behind by interrupted writes.
    ///
    /// # Errors
    /// - If the directory cannot be created or read
    /// - If the path exists but is not a directory
    pub fn init(&mut self) -> crate::Result<()> {
        internal!("Initialising blob store at {} ...", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        self.cleanup_temp_files()
    }

    fn cleanup_temp_files(&self) -> crate::Result<()> {
        let mut cleaned = 0;

        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned temp files from blob store"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, key: &MessageKey, data: &[u8]) -> crate::Result<()> {
        let target = self.blob_path(key);
        let temp = self.path.join(format!(
            "{TEMP_PREFIX}{key}.{}.{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        write_atomically(&temp, &target, data).await?;

        internal!(level = DEBUG, "Stored blob {key} at {}", target.display());

        Ok(())
    }

    async fn get(&self, key: &MessageKey) -> crate::Result<Arc<[u8]>> {
        match fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(Arc::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn del(&self, key: &MessageKey) -> crate::Result<()> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => {
                internal!(level = DEBUG, "Deleted blob {key}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `data` to `temp`, then rename it over `target`
///
/// A failure at either step removes whatever part of `temp` was written.
async fn write_atomically(temp: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let written = match fs::write(temp, data).await {
        Ok(()) => fs::rename(temp, target).await,
        Err(e) => Err(e),
    };

    if written.is_err() {
        let _ = fs::remove_file(temp).await;
    }

    written
}

/// Builder for `DiskBlobStore`
#[derive(Debug, Default)]
pub struct DiskBlobStoreBuilder {
    path: PathBuf,
}

impl DiskBlobStoreBuilder {
    /// Set the store directory
    #[must_use]
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Build the final `DiskBlobStore`
    ///
    /// # Errors
    /// Returns an error if the path is invalid or potentially dangerous
    pub fn build(self) -> crate::Result<DiskBlobStore> {
        DiskBlobStore::validate_path(&self.path)?;
        Ok(DiskBlobStore { path: self.path })
    }
}
