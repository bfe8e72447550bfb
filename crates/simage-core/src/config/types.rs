//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of hash workers attached to the broker in local mode
    pub hash_workers: usize,

    /// Supported input formats
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            hash_workers: 4,
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "gif".to_string(),
                "bmp".to_string(),
                "webp".to_string(),
                "tiff".to_string(),
            ],
        }
    }
}

/// Pipeline settings for backpressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max decoded images held in the output queue before the loader blocks
    pub buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { buffer_size: 400 }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 20000,
        }
    }
}

/// Hashing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Edge length of the square image sent in a hash request
    pub resize_dimension: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            resize_dimension: 32,
        }
    }
}

/// Broker addresses and message handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Address hash workers consume requests from
    pub request_address: String,

    /// Address hash results and corrupt reports are sent to
    pub result_address: String,

    /// Address repository queries are sent to
    pub repository_address: String,

    /// Address repository answers are sent to
    pub reply_address: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            request_address: "hash.request".to_string(),
            result_address: "hash.result".to_string(),
            repository_address: "repository.query".to_string(),
            reply_address: "repository.reply".to_string(),
        }
    }
}

/// Record storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON-Lines file holding recorded path/hash pairs
    pub records_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_path: PathBuf::from("~/.simage/records.jsonl"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,

    /// Log format (pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
