use std::path::PathBuf;

use crate::domain::{AppConfig, DomainError};

/// Configuration store port for the persisted JSON settings file.
///
/// No locking is provided: concurrent writers race and the last one wins.
pub trait ConfigStore: Send + Sync {
    /// Load configuration from persistent storage.
    ///
    /// Fails with `ConfigMissing` when the file does not exist (the caller
    /// decides whether to fall back to defaults) and `ConfigCorrupt` when it
    /// cannot be parsed.
    fn load(&self) -> Result<AppConfig, DomainError>;

    /// Atomically overwrite the configuration file.
    fn save(&self, config: &AppConfig) -> Result<(), DomainError>;

    /// Path of the configuration file.
    fn config_path(&self) -> PathBuf;

    /// Application data directory (model files live under `models/` here).
    fn data_dir(&self) -> PathBuf;

    /// Log directory.
    fn logs_dir(&self) -> PathBuf;
}
