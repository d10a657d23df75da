//! Sub-configuration structs and their defaults.

use crate::types::Confidence;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Input column mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Column holding the claimed states list (required)
    pub states_column: String,

    /// Column holding the pharmacy identifier
    pub id_column: String,

    /// Column holding the pharmacy name
    pub name_column: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            states_column: "Operates in states".to_string(),
            id_column: "NCPDPID".to_string(),
            name_column: "StoreName".to_string(),
        }
    }
}

/// Batching, pacing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pharmacies per provider call
    pub batch_size: usize,

    /// Pause between provider calls, in seconds
    pub rate_limit_delay_secs: f64,

    /// Provider calls per batch before downgrading to error rows
    pub max_attempts: u32,

    /// Base backoff for transient failures, in milliseconds
    pub retry_delay_ms: u64,

    /// Base backoff after a rate-limit rejection, in milliseconds
    pub rate_limit_backoff_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            rate_limit_delay_secs: 2.0,
            max_attempts: 3,
            retry_delay_ms: 1000,
            rate_limit_backoff_ms: 10_000,
        }
    }
}

/// Output file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for validated CSVs and checkpoints
    pub dir: PathBuf,

    /// Output file name; `{timestamp}` is replaced at run start
    pub file_pattern: String,

    /// Explicit checkpoint location (defaults to `<dir>/<input stem>.checkpoint.json`)
    pub checkpoint_path: Option<PathBuf>,

    /// Keep the checkpoint file after a clean run
    pub keep_checkpoint: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file_pattern: "validated_pharmacies_{timestamp}.csv".to_string(),
            checkpoint_path: None,
            keep_checkpoint: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Console log format: "pretty" or "json"
    pub format: String,

    /// Also write a timestamped log file
    pub file: bool,

    /// Directory for log files
    pub dir: PathBuf,

    /// Log file name; `{timestamp}` is replaced at startup
    pub file_pattern: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: true,
            dir: PathBuf::from("."),
            file_pattern: "validation_log_{timestamp}.log".to_string(),
        }
    }
}

/// What to do with corrections the oracle asserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Apply corrections that drop states from the claim
    pub accept_narrowing: bool,

    /// Apply corrections that add states to the claim
    pub accept_widening: bool,

    /// Corrections reported below this confidence are withheld
    pub min_correction_confidence: Confidence,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            accept_narrowing: true,
            accept_widening: true,
            min_correction_confidence: Confidence::Low,
        }
    }
}

/// Supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI deep-research models (slow, strongest grounding)
    #[default]
    OpenAi,
    /// Google Gemini with search grounding (fast)
    Google,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "google" | "gemini" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Google => "google",
        }
    }

    /// Vendor label used in the output column header.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Google => "Google",
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn key_env_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider selection plus per-backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend used for this run
    pub selected: ProviderKind,

    /// OpenAI configuration
    pub openai: OpenAiConfig,

    /// Google Gemini configuration
    pub google: GoogleConfig,
}

/// OpenAI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Chat Completions endpoint
    pub endpoint: String,

    /// Request web search grounding
    pub search_grounding: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Completion token ceiling
    pub max_tokens: u32,

    /// Sampling temperature (omitted from the request when unset)
    pub temperature: Option<f32>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: "${OPENAI_API_KEY}".to_string(),
            model: "o3-deep-research".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            search_grounding: true,
            timeout_secs: 600,
            max_tokens: 4000,
            temperature: Some(0.1),
        }
    }
}

/// Google Gemini configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Generative Language API base URL
    pub endpoint: String,

    /// Attach the google_search tool
    pub search_grounding: bool,

    /// Attach the url_context tool
    pub url_grounding: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Output token ceiling
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: "${GOOGLE_API_KEY}".to_string(),
            model: "gemini-2.5-pro".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            search_grounding: true,
            url_grounding: true,
            timeout_secs: 180,
            max_tokens: 4000,
            temperature: Some(0.1),
        }
    }
}
