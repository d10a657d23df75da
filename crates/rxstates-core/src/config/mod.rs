//! Configuration management for rxstates.
//!
//! Configuration is loaded from the platform config directory. Every section
//! is optional; defaults validate 30 pharmacies per call with a two second
//! pause between calls.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input column mapping
    pub input: InputConfig,

    /// Batching and retry settings
    pub batch: BatchConfig,

    /// Output file settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Correction policy
    pub policy: PolicyConfig,

    /// Provider settings
    pub provider: ProviderConfig,
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
    /// - macOS: ~/Library/Application Support/com.rxstates.rxstates/config.toml
    /// - Linux: ~/.config/rxstates/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\rxstates\config\config.toml
    ///
    /// Falls back to ~/.rxstates/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "rxstates", "rxstates")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".rxstates").join("config.toml")
            })
    }

    /// Resolved output directory (with ~ expansion).
    pub fn output_dir(&self) -> PathBuf {
        expand_path(&self.output.dir)
    }

    /// Resolved log directory (with ~ expansion).
    pub fn log_dir(&self) -> PathBuf {
        expand_path(&self.logging.dir)
    }

    /// Output CSV path for a run started at `started`.
    pub fn output_path(&self, started: DateTime<Local>) -> PathBuf {
        self.output_dir()
            .join(stamp(&self.output.file_pattern, started))
    }

    /// Log file path for a process started at `started`.
    pub fn log_path(&self, started: DateTime<Local>) -> PathBuf {
        self.log_dir().join(stamp(&self.logging.file_pattern, started))
    }

    /// Checkpoint path for a given input file.
    ///
    /// Keyed on the input's file stem so that a re-run on the same input
    /// finds the previous checkpoint even though the output name changes.
    pub fn checkpoint_path(&self, input: &Path) -> PathBuf {
        if let Some(path) = &self.output.checkpoint_path {
            return expand_path(path);
        }
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        self.output_dir().join(format!("{stem}.checkpoint.json"))
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn stamp(pattern: &str, at: DateTime<Local>) -> String {
    pattern.replace("{timestamp}", &at.format("%Y%m%d_%H%M%S").to_string())
}

fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}
