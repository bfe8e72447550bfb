//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.hash_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.hash_workers must be > 0".into(),
            ));
        }
        if self.pipeline.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.buffer_size must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.hashing.resize_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "hashing.resize_dimension must be > 0".into(),
            ));
        }

        let messaging = &self.messaging;
        let addresses = [
            ("messaging.request_address", &messaging.request_address),
            ("messaging.result_address", &messaging.result_address),
            ("messaging.repository_address", &messaging.repository_address),
            ("messaging.reply_address", &messaging.reply_address),
        ];
        for (i, (name, address)) in addresses.iter().enumerate() {
            if address.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must not be empty"
                )));
            }
            if let Some((other, _)) = addresses[..i].iter().find(|(_, a)| a == address) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must differ from {other}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_hash_workers() {
        let mut config = Config::default();
        config.processing.hash_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hash_workers"));
    }

    #[test]
    fn test_validate_rejects_zero_buffer_size() {
        let mut config = Config::default();
        config.pipeline.buffer_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buffer_size"));
    }

    #[test]
    fn test_validate_rejects_empty_address() {
        let mut config = Config::default();
        config.messaging.result_address = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("result_address"));
    }

    #[test]
    fn test_validate_rejects_shared_address() {
        let mut config = Config::default();
        config.messaging.result_address = config.messaging.request_address.clone();
        let err = config.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("result_address must differ from messaging.request_address"));
    }
}
