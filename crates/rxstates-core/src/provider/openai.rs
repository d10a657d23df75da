//! OpenAI provider using the Chat Completions API.
//!
//! The deep-research backend: slow, expensive, strongest grounding. Web
//! search is requested through `web_search_options` when enabled.

use super::backend::{status_error, transport_error, RawReply, ValidationProvider};
use super::prompt::{build_prompt, SYSTEM_PROMPT};
use crate::config::OpenAiConfig;
use crate::error::ProviderError;
use crate::pipeline::Batch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// OpenAI provider using Chat Completions API.
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    endpoint: String,
    search_grounding: bool,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, config: &OpenAiConfig) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            search_grounding: config.search_grounding,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, batch: &Batch) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(batch),
                },
            ],
            max_completion_tokens: self.max_tokens,
            temperature: self.temperature,
            web_search_options: self.search_grounding.then_some(WebSearchOptions {}),
        }
    }
}

// --- Request types ---

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct WebSearchOptions {}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    annotations: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[async_trait]
impl ValidationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn label(&self) -> &str {
        "OpenAI"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn validate_batch(&self, batch: &Batch) -> Result<RawReply, ProviderError> {
        let start = Instant::now();
        tracing::info!(
            "Validating batch {} ({} pharmacies) with OpenAI {}",
            batch.index + 1,
            batch.len(),
            self.model
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(batch))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), self.timeout, e))?;

        if !resp.status().is_success() {
            return Err(status_error(self.name(), resp).await);
        }

        let chat_resp: ChatResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(self.name(), self.timeout, e)
            } else {
                ProviderError::Decode {
                    provider: self.name().to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let choice = chat_resp.choices.into_iter().next();
        let grounding_sources = choice
            .as_ref()
            .map(|c| c.message.annotations.len())
            .unwrap_or(0);
        let text = choice
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::EmptyReply {
                provider: self.name().to_string(),
            })?;

        tracing::debug!("OpenAI response: {text}");

        Ok(RawReply {
            text,
            model: chat_resp.model,
            tokens_used: chat_resp.usage.map(|u| u.total_tokens),
            latency_ms: start.elapsed().as_millis() as u64,
            grounding_sources,
        })
    }
}
