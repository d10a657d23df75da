//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch.batch_size must be > 0".into(),
            ));
        }
        if self.batch.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_attempts must be > 0".into(),
            ));
        }
        if !self.batch.rate_limit_delay_secs.is_finite() || self.batch.rate_limit_delay_secs < 0.0
        {
            return Err(ConfigError::ValidationError(
                "batch.rate_limit_delay_secs must be a non-negative number".into(),
            ));
        }
        if self.input.states_column.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "input.states_column must not be empty".into(),
            ));
        }
        if !self.output.file_pattern.contains("{timestamp}") {
            return Err(ConfigError::ValidationError(
                "output.file_pattern must contain {timestamp}".into(),
            ));
        }
        if self.provider.openai.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.openai.timeout_secs must be > 0".into(),
            ));
        }
        if self.provider.google.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.google.timeout_secs must be > 0".into(),
            ));
        }
        if !matches!(
            self.logging.level.as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level '{}' is not one of error, warn, info, debug, trace",
                self.logging.level
            )));
        }
        Ok(())
    }
}
