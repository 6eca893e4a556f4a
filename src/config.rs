use std::path::{Path, PathBuf};

use mailqueue_common::internal;
use mailqueue_queue::{BusConfig, QueueContext, RecordError, RecordsConfig};
use mailqueue_store::{StoreError, StoreConfig};
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "MAILQUEUE_CONFIG";

const DEFAULT_PATHS: [&str; 2] = [
    "./mailqueue.config.ron",
    "/etc/mailqueue/mailqueue.config.ron",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MAILQUEUE_CONFIG points to non-existent file: {}", .0.display())]
    MissingEnvPath(PathBuf),

    #[error("No configuration file found. Tried:\n  - MAILQUEUE_CONFIG environment variable\n{tried}")]
    NotFound { tried: String },

    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Unable to open content store: {0}")]
    Store(#[from] StoreError),

    #[error("Unable to open record store: {0}")]
    Records(#[from] RecordError),
}

/// Top-level configuration
///
/// ```ron
/// (
///     store: Disk(source: "/var/spool/mailqueue"),
///     records: Sqlite(source: "/var/lib/mailqueue/queue.db"),
///     bus: Nsq(address: "127.0.0.1:4150"),
/// )
/// ```
///
/// Every section is optional. The defaults are a disk store under
/// `/var/spool/mailqueue` with in-memory records and bus, which only makes
/// sense for trying things out.
#[derive(Debug, Default, Deserialize)]
pub struct MailQueue {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

impl MailQueue {
    /// Parse a RON document
    ///
    /// # Errors
    /// Returns an error if `content` is not a valid configuration
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(content)?)
    }

    /// Read and parse the file at `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        internal!(level = DEBUG, "Loaded configuration from {}", path.display());
        Self::parse(&content)
    }

    /// Open every configured adapter
    ///
    /// # Errors
    /// Returns an error if the content store or record store cannot be opened
    pub async fn into_context(self) -> Result<QueueContext, ConfigError> {
        internal!(
            level = INFO,
            "Opening {} content store, records {:?}, bus {:?}",
            self.store.driver(),
            self.records,
            self.bus
        );

        let store = self.store.into_blob_store()?;
        let records = self.records.into_record_store().await?;
        let bus = self.bus.into_bus();

        Ok(QueueContext::new(store, records, bus))
    }
}

/// Find the configuration file using the following precedence:
/// 1. `MAILQUEUE_CONFIG` environment variable
/// 2. ./mailqueue.config.ron (current working directory)
/// 3. /etc/mailqueue/mailqueue.config.ron (system-wide config)
///
/// # Errors
/// Returns an error if the environment variable names a missing file, or if
/// none of the default locations exist
pub fn find_config_file() -> Result<PathBuf, ConfigError> {
    let defaults: Vec<PathBuf> = DEFAULT_PATHS.iter().map(PathBuf::from).collect();
    locate(std::env::var_os(CONFIG_ENV).map(PathBuf::from), &defaults)
}

fn locate(env_path: Option<PathBuf>, defaults: &[PathBuf]) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_path {
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::MissingEnvPath(path));
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::NotFound { tried })
}
