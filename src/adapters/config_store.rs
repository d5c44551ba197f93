use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::domain::{AppConfig, DomainError};
use crate::ports::ConfigStore;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "VOICEBRIDGE_CONFIG";

/// JSON-based configuration store with OS-specific paths.
///
/// The file is shared with the settings app; there is no cross-process
/// locking and the last writer wins.
pub struct JsonConfigStore {
    data_dir: PathBuf,
    config_path: PathBuf,
}

impl JsonConfigStore {
    /// Create a new JsonConfigStore rooted at the OS application data
    /// directory, honoring the `VOICEBRIDGE_CONFIG` override.
    pub fn new() -> Result<Self, DomainError> {
        let data_dir = Self::get_data_dir()?;
        fs::create_dir_all(&data_dir)?;

        let config_path = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => PathBuf::from(path),
            None => data_dir.join("config.json"),
        };

        info!(data_dir = ?data_dir, config_path = ?config_path, "ConfigStore initialized");

        Ok(Self {
            data_dir,
            config_path,
        })
    }

    /// Store rooted at an explicit directory. Used by the tests and by
    /// anything that needs a non-default location.
    pub fn with_dir(data_dir: PathBuf) -> Self {
        let config_path = data_dir.join("config.json");
        Self {
            data_dir,
            config_path,
        }
    }

    /// OS-specific application data directory:
    /// - Linux: ~/.config/voicebridge/
    /// - macOS: ~/Library/Application Support/voicebridge/
    /// - Windows: %APPDATA%\voicebridge\
    fn get_data_dir() -> Result<PathBuf, DomainError> {
        #[cfg(target_os = "macos")]
        {
            dirs::data_dir()
                .map(|p| p.join("voicebridge"))
                .ok_or_else(|| {
                    DomainError::ConfigWrite("could not find application data directory".to_string())
                })
        }

        #[cfg(not(target_os = "macos"))]
        {
            dirs::config_dir()
                .map(|p| p.join("voicebridge"))
                .ok_or_else(|| {
                    DomainError::ConfigWrite("could not find application data directory".to_string())
                })
        }
    }

    /// Directory the service resolves model weights from.
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        if !self.config_path.exists() {
            return Err(DomainError::ConfigMissing(self.config_path.clone()));
        }

        debug!(path = ?self.config_path, "Loading configuration");
        let content = fs::read_to_string(&self.config_path)?;
        let config: AppConfig =
            serde_json::from_str(&content).map_err(|e| DomainError::ConfigCorrupt(e.to_string()))?;

        info!(path = ?self.config_path, model = %config.model, device = %config.device, "Configuration loaded");
        Ok(config)
    }

    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| DomainError::ConfigWrite(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(config)?;

        // Write to a temp file first, then rename atomically so a concurrent
        // reader never observes a half-written file.
        let temp_path = self.config_path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(|e| DomainError::ConfigWrite(e.to_string()))?;
        fs::rename(&temp_path, &self.config_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            DomainError::ConfigWrite(e.to_string())
        })?;

        info!(path = ?self.config_path, "Configuration saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.config_path.clone()
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
