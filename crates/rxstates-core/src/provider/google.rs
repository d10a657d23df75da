//! Google Gemini provider using the `generateContent` API.
//!
//! The fast backend. Search grounding attaches the `google_search` tool and
//! URL grounding the `url_context` tool; the prompt gains a search-strategy
//! section whenever either is on.

use super::backend::{status_error, transport_error, RawReply, ValidationProvider};
use super::prompt::{build_prompt, search_strategy, SYSTEM_PROMPT};
use crate::config::GoogleConfig;
use crate::error::ProviderError;
use crate::pipeline::Batch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Gemini provider.
pub struct GoogleProvider {
    api_key: String,
    model: String,
    endpoint: String,
    search_grounding: bool,
    url_grounding: bool,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout: Duration,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(api_key: &str, config: &GoogleConfig) -> Self {
        tracing::info!(
            "Gemini model: {}, search grounding: {}, URL grounding: {}",
            config.model,
            config.search_grounding,
            config.url_grounding
        );
        Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            search_grounding: config.search_grounding,
            url_grounding: config.url_grounding,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn request_body(&self, batch: &Batch) -> GenerateRequest {
        let mut prompt = build_prompt(batch);
        prompt.push_str(&search_strategy(self.search_grounding, self.url_grounding));

        let mut tools = Vec::new();
        if self.search_grounding {
            tools.push(Tool::GoogleSearch {});
        }
        if self.url_grounding {
            tools.push(Tool::UrlContext {});
        }

        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: prompt }],
            }],
            tools,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        }
    }
}

// --- Request types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Tool {
    GoogleSearch {},
    UrlContext {},
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_output_tokens: u32,
}

// --- Response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u32>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    fn grounding_sources(&self) -> usize {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|g| g.grounding_chunks.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ValidationProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn label(&self) -> &str {
        "Google"
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
            "Validating batch {} ({} pharmacies) with Google {}",
            batch.index + 1,
            batch.len(),
            self.model
        );

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&self.request_body(batch))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), self.timeout, e))?;

        if !resp.status().is_success() {
            return Err(status_error(self.name(), resp).await);
        }

        let gen_resp: GenerateResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(self.name(), self.timeout, e)
            } else {
                ProviderError::Decode {
                    provider: self.name().to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let text = gen_resp.text().trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::EmptyReply {
                provider: self.name().to_string(),
            });
        }
        tracing::debug!("Google Gemini response: {text}");

        Ok(RawReply {
            grounding_sources: gen_resp.grounding_sources(),
            text,
            model: gen_resp
                .model_version
                .unwrap_or_else(|| self.model.clone()),
            tokens_used: gen_resp.usage_metadata.and_then(|u| u.total_token_count),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
