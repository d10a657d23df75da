//! rxstates core: batch validation of mail-order pharmacy states of operation.
//!
//! Each pharmacy in an input CSV claims a set of US states it ships to. The
//! pipeline sends the pharmacies to a search-grounded AI provider in batches,
//! parses the verdicts, and writes the input back out with four result
//! columns appended.
//!
//! # Architecture
//!
//! ```text
//! CSV → Dataset → Batches → Provider → Parse (strict | fallback) → Reconcile → CSV
//!                    ↑                                                 │
//!                    └──────────── RunCheckpoint (resume) ─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use rxstates_core::{Config, Dataset, ProviderFactory, RunOptions, RunPlan, Validator};
//!
//! #[tokio::main]
//! async fn main() -> rxstates_core::Result<()> {
//!     let config = Config::load()?;
//!     let dataset = Dataset::load("pharmacies.csv".as_ref(), &config.input)?;
//!     let provider = ProviderFactory::create(config.provider.selected, &config.provider, None)?;
//!     let validator = Validator::new(provider, RunOptions::from_config(&config), config.policy.clone());
//!     let outcome = validator.run(&dataset, &plan, |_| {}).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod parse;
pub mod pipeline;
pub mod provider;
pub mod sink;
pub mod states;
pub mod types;

// Re-exports for convenient access
pub use config::{Config, PolicyConfig, ProviderKind};
pub use dataset::Dataset;
pub use error::{ConfigError, ParseError, ProviderError, Result, RxError, SinkError};
pub use parse::{parse_reply, ParseStage, ParsedBatch, ReplyEntry};
pub use pipeline::{
    Batch, BatchEvent, BatchOutcome, RunCheckpoint, RunFingerprint, RunOptions, RunOutcome,
    RunPlan, RunReport, RunSettings, Validator,
};
pub use provider::{Provider, ProviderFactory, RawReply, ValidationProvider};
pub use sink::{CsvSink, ResultSink};
pub use types::{Confidence, PharmacyRecord, RunSummary, ValidationResult, Verdict};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
