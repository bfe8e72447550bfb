//! Configuration management for simage.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file is valid.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for simage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Processing settings
    pub processing: ProcessingConfig,

    /// Pipeline settings
    pub pipeline: PipelineConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Hashing settings
    pub hashing: HashingConfig,

    /// Broker addresses
    pub messaging: MessagingConfig,

    /// Record storage
    pub storage: StorageConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.simage.simage/config.toml
    /// - Linux: ~/.config/simage/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\simage\config\config.toml
    ///
    /// Falls back to ~/.simage/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "simage", "simage")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".simage").join("config.toml")
            })
    }

    /// Get the resolved record file path (with ~ expansion).
    pub fn records_path(&self) -> PathBuf {
        let path_str = self.storage.records_path.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.processing.hash_workers, 4);
        assert_eq!(config.pipeline.buffer_size, 400);
        assert_eq!(config.hashing.resize_dimension, 32);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[pipeline]"));
        assert!(toml.contains("[messaging]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nbuffer_size = 8\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pipeline.buffer_size, 8);
        assert_eq!(config.messaging.request_address, "hash.request");
    }

    #[test]
    fn test_messaging_section_lists_served_addresses() {
        let toml = Config::default().to_toml().unwrap();
        assert!(toml.contains("reply_address"));
        assert!(!toml.contains("attribute"));
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nbuffer_size = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_records_path_expands_tilde() {
        let config = Config::default();
        assert!(!config.records_path().to_string_lossy().starts_with('~'));
    }
}
