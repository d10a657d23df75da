//! Provider trait, raw reply type, and the closed set of backends.
//!
//! Backends are selected once at startup by [`ProviderFactory::create`]; the
//! orchestrator is generic over [`ValidationProvider`] so the choice is fixed
//! for the whole run.

use super::google::GoogleProvider;
use super::openai::OpenAiProvider;
use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{ConfigError, ProviderError};
use crate::pipeline::Batch;
use async_trait::async_trait;
use std::time::Duration;

/// The unparsed answer covering one batch.
#[derive(Debug, Clone)]
pub struct RawReply {
    /// Reply text as produced by the model
    pub text: String,
    /// Model identifier that answered
    pub model: String,
    /// Number of tokens used (input + output), if reported
    pub tokens_used: Option<u32>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
    /// Web sources the backend reported grounding on
    pub grounding_sources: usize,
}

/// Trait that all validation backends implement.
#[async_trait]
pub trait ValidationProvider: Send + Sync {
    /// Provider name for logging (e.g., "openai").
    fn name(&self) -> &str;

    /// Vendor label for the output column header (e.g., "OpenAI").
    fn label(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Per-request timeout for this provider.
    fn timeout(&self) -> Duration;

    /// Ask the backend to adjudicate every pharmacy in `batch` in one call.
    async fn validate_batch(&self, batch: &Batch) -> Result<RawReply, ProviderError>;
}

/// The configured backend.
pub enum Provider {
    OpenAi(OpenAiProvider),
    Google(GoogleProvider),
}

#[async_trait]
impl ValidationProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Self::OpenAi(p) => p.name(),
            Self::Google(p) => p.name(),
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::OpenAi(p) => p.label(),
            Self::Google(p) => p.label(),
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::OpenAi(p) => p.model(),
            Self::Google(p) => p.model(),
        }
    }

    fn timeout(&self) -> Duration {
        match self {
            Self::OpenAi(p) => p.timeout(),
            Self::Google(p) => p.timeout(),
        }
    }

    async fn validate_batch(&self, batch: &Batch) -> Result<RawReply, ProviderError> {
        match self {
            Self::OpenAi(p) => p.validate_batch(batch).await,
            Self::Google(p) => p.validate_batch(batch).await,
        }
    }
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Factory that creates the configured backend.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the backend named by `kind`.
    ///
    /// # Arguments
    /// * `kind` - Which backend to build
    /// * `config` - The full provider config section
    /// * `model_override` - Optional model name that overrides the config default
    pub fn create(
        kind: ProviderKind,
        config: &ProviderConfig,
        model_override: Option<&str>,
    ) -> Result<Provider, ConfigError> {
        let missing = || ConfigError::MissingCredential {
            provider: kind.to_string(),
            env_var: kind.key_env_var().to_string(),
        };
        match kind {
            ProviderKind::OpenAi => {
                let mut cfg = config.openai.clone();
                let api_key = resolve_env_var(&cfg.api_key).ok_or_else(missing)?;
                if let Some(model) = model_override {
                    cfg.model = model.to_string();
                }
                Ok(Provider::OpenAi(OpenAiProvider::new(&api_key, &cfg)))
            }
            ProviderKind::Google => {
                let mut cfg = config.google.clone();
                let api_key = resolve_env_var(&cfg.api_key).ok_or_else(missing)?;
                if let Some(model) = model_override {
                    cfg.model = model.to_string();
                }
                Ok(Provider::Google(GoogleProvider::new(&api_key, &cfg)))
            }
        }
    }
}

/// Map a transport-level reqwest failure onto the error taxonomy.
pub(crate) fn transport_error(
    provider: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        ProviderError::Network {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

/// Turn a non-success HTTP response into a typed error.
pub(crate) async fn status_error(provider: &str, resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = resp.text().await.unwrap_or_default();
    classify_status(provider, status, retry_after, body)
}

pub(crate) fn classify_status(
    provider: &str,
    status: u16,
    retry_after: Option<Duration>,
    message: String,
) -> ProviderError {
    let provider = provider.to_string();
    match status {
        401 | 403 => ProviderError::Auth {
            provider,
            status,
            message,
        },
        429 => ProviderError::RateLimited {
            provider,
            retry_after,
            message,
        },
        _ => ProviderError::Http {
            provider,
            status,
            message,
        },
    }
}
