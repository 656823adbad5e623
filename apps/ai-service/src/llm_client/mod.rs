/// LLM client for OpenRouter chat completions.
///
/// Every generation goes through `MetadataGenerator`. `LlmClient` is the
/// production implementation: one request per call with a strict JSON schema,
/// token usage and cost telemetry, and repair of recoverable responses.
/// Retries are the workflow's concern, not the client's.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod extraction;
pub mod pricing;
pub mod schema;

use extraction::ExtractionError;
use pricing::{calculate_cost, PricingCache};

const REFERER: &str = "https://github.com/teacher-assist";
const TITLE: &str = "Teacher Assist - Lesson Planner";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub fallback_prompt_price: f64,
    pub fallback_completion_price: f64,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Nieoczekiwany błąd podczas wywołania LLM: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Przekroczono limit czasu oczekiwania na odpowiedź LLM ({seconds}s)")]
    Timeout { seconds: u64 },

    #[error("Błąd API OpenRouter (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Nieprawidłowy format odpowiedzi z OpenRouter API: brak treści odpowiedzi")]
    EmptyContent,

    #[error("Nieprawidłowy format odpowiedzi z OpenRouter API: {0}")]
    Format(String),

    #[error(transparent)]
    Parse(#[from] ExtractionError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    /// USD
    pub estimated_cost: f64,
}

/// One completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Cleaned JSON text of the model's answer.
    pub raw_response: String,
    /// Logged only, never returned to callers.
    pub reasoning: Option<String>,
    pub usage: Usage,
}

#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: Value,
    include_reasoning: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    pricing: Arc<PricingCache>,
}

impl LlmClient {
    pub fn new(config: LlmConfig, pricing: Arc<PricingCache>) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert("http-referer", HeaderValue::from_static(REFERER));
        headers.insert("x-title", HeaderValue::from_static(TITLE));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            config,
            pricing,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else {
            LlmError::Http(e)
        }
    }

    async fn send(&self, prompt: &str) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: schema::response_format(),
            include_reasoning: true,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("OpenRouter returned {}: {}", status, body);
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| LlmError::Format(e.to_string()))
    }

    /// Priced from the cache; any pricing failure falls back to configured prices.
    async fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.pricing.price_for(&self.config.model).await {
            Ok(pricing) => pricing.cost(input_tokens, output_tokens),
            Err(e) => {
                warn!(
                    "Failed to fetch pricing ({e}), using fallback prices: ${:.8}/token (input), ${:.8}/token (output)",
                    self.config.fallback_prompt_price, self.config.fallback_completion_price
                );
                calculate_cost(
                    input_tokens,
                    output_tokens,
                    self.config.fallback_prompt_price,
                    self.config.fallback_completion_price,
                )
            }
        }
    }
}

#[async_trait]
impl MetadataGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<Generation, LlmError> {
        debug!("Prompt:\n{prompt}");

        let response = self.send(prompt).await?;

        let message = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .ok_or_else(|| LlmError::Format("missing 'choices' or 'message'".to_string()))?;
        let content = message.content.ok_or(LlmError::EmptyContent)?;
        debug!("Raw response:\n{content}");

        let extracted = extraction::extract_json(&content)?;

        // Native reasoning wins over in-content tags.
        let reasoning = message
            .reasoning
            .filter(|r| !r.trim().is_empty())
            .or(extracted.reasoning);
        if let Some(reasoning) = &reasoning {
            debug!("Reasoning:\n{reasoning}");
        }

        let (input_tokens, output_tokens, total_tokens) = match response.usage {
            Some(usage) => (
                usage.prompt_tokens,
                usage.completion_tokens,
                usage
                    .total_tokens
                    .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
            ),
            None => (0, 0, 0),
        };
        let estimated_cost = self.estimate_cost(input_tokens, output_tokens).await;

        info!(
            model = %self.config.model,
            input_tokens,
            output_tokens,
            "LLM call succeeded: estimated cost ${estimated_cost:.6}"
        );

        Ok(Generation {
            raw_response: extracted.json,
            reasoning,
            usage: Usage {
                input_tokens,
                output_tokens,
                total_tokens,
                estimated_cost,
            },
        })
    }
}
