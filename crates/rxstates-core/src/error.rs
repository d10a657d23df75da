//! Error types for the rxstates validation pipeline.
//!
//! Errors are split by how far they are allowed to travel: configuration and
//! sink errors abort a run, while provider and parse errors stay inside the
//! batch that produced them and are downgraded to error rows.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for rxstates operations.
#[derive(Error, Debug)]
pub enum RxError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Output or checkpoint persistence failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors. Always fatal, always raised before the
/// first provider call.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// No credential resolved for the selected provider
    #[error("{provider} API key not set. Set the {env_var} environment variable or provider.{provider}.api_key")]
    MissingCredential { provider: String, env_var: String },

    /// Unknown provider name
    #[error("Unknown provider '{0}'. Supported providers: openai, google")]
    UnknownProvider(String),

    /// The input dataset could not be opened or decoded
    #[error("Failed to read input {path}: {message}")]
    Input { path: PathBuf, message: String },

    /// The input dataset lacks a required column
    #[error("Required column '{column}' not found in {path}. Available columns: {available:?}")]
    MissingColumn {
        path: PathBuf,
        column: String,
        available: Vec<String>,
    },

    /// The input dataset has a header but no rows
    #[error("Input {0} contains no pharmacy rows")]
    EmptyInput(PathBuf),
}

/// Failures talking to a provider backend.
///
/// Kinds are kept distinct so the retry policy can tell a rate-limit pause
/// from a flaky connection from a bad credential.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The request did not complete within the provider's timeout
    #[error("{provider} request timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Credential rejected (HTTP 401/403)
    #[error("{provider} rejected credentials (HTTP {status}): {message}")]
    Auth {
        provider: String,
        status: u16,
        message: String,
    },

    /// Rate limit hit (HTTP 429)
    #[error("{provider} rate limit exceeded: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Any other non-success HTTP status
    #[error("{provider} HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// Connection-level failure (DNS, refused, reset)
    #[error("{provider} request failed: {message}")]
    Network { provider: String, message: String },

    /// The response envelope could not be decoded
    #[error("Failed to decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    /// The response decoded but carried no text
    #[error("{provider} returned an empty reply")]
    EmptyReply { provider: String },
}

/// A reply that could not be turned into results at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Neither strict decoding nor tolerant extraction found any entries
    #[error("no validation entries found in reply ({reply_len} chars)")]
    Unparseable { reply_len: usize },

    /// Entries were found but none refer to a pharmacy in the batch
    #[error("reply contained {entries} entries but none matched the batch")]
    NoMatches { entries: usize },
}

/// Failures persisting output rows or the run checkpoint. Always fatal.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Output file could not be created, written or flushed
    #[error("Failed writing output {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding/decoding failure on the output file
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// An output file from a previous run does not match its checkpoint
    #[error("Cannot resume from {path}: {message}")]
    Resume { path: PathBuf, message: String },

    /// Checkpoint file could not be written
    #[error("Failed writing checkpoint {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },
}

/// Convenience type alias for rxstates results.
pub type Result<T> = std::result::Result<T, RxError>;
