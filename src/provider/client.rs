//! Provider Adapter (C3): the single point of contact with LLM providers.
//!
//! Concrete adapters implement the `LLMClient` trait's synchronous
//! `complete` call plus the coarse-grained batch surface
//! (`submit_batch`/`poll`). No provider-specific wire field leaks past this
//! module — callers only see `CompletionRequest`/`CompletionResponse`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::error::{Error, ProviderErrorKind, Result};

use super::types::{
    ChatRole, CompletionRequest, CompletionResponse, ModelSpec, Provider, TokenLogprobs,
    TokenUsage,
};

/// A single unit of batch work: one (prompt) request tagged with a caller
/// id so results can be matched back up after the batch completes.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: String,
    pub request: CompletionRequest,
}

#[derive(Debug, Clone)]
pub struct BatchHandle {
    pub id: String,
    pub job_count: usize,
}

#[derive(Debug, Clone)]
pub enum BatchStatus {
    InProgress,
    Completed(Vec<BatchResult>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub job_id: String,
    pub response: std::result::Result<CompletionResponse, String>,
}

/// LLM client trait implemented once per provider.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Submit a batch job. The default implementation executes every job as
    /// an individual `complete` call and reports it as already completed —
    /// providers with a native batch API override this.
    async fn submit_batch(&self, jobs: Vec<BatchJob>) -> Result<BatchHandle> {
        let handle = BatchHandle {
            id: uuid::Uuid::new_v4().to_string(),
            job_count: jobs.len(),
        };
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let response = self
                .complete(job.request)
                .await
                .map_err(|e| e.to_string());
            results.push(BatchResult {
                job_id: job.id,
                response,
            });
        }
        self.stash_batch_results(&handle.id, results);
        Ok(handle)
    }

    async fn poll(&self, handle: &BatchHandle) -> Result<BatchStatus>;

    /// Storage hook for the default `submit_batch` fallback above; real
    /// batch-API-backed clients can ignore this.
    fn stash_batch_results(&self, _handle_id: &str, _results: Vec<BatchResult>) {}

    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64;

    fn provider(&self) -> Provider;

    fn available_models(&self) -> Vec<ModelSpec>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            timeout_secs: 60,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

fn build_http_client(timeout_secs: u64) -> Client {
    let timeout = Duration::from_secs(timeout_secs);
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("failed to construct fallback HTTP client"),
    }
}

// ---------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------

pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

fn classify_status_error(status: reqwest::StatusCode, body: &str) -> Error {
    if status.as_u16() == 429 {
        return Error::provider(true, ProviderErrorKind::RateLimited, body);
    }
    if status.is_server_error() {
        return Error::provider(true, ProviderErrorKind::Other, body);
    }
    Error::provider(false, ProviderErrorKind::Other, body)
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .or_else(|| self.config.default_model.clone())
            .unwrap_or_else(|| "claude-3-5-sonnet-20241022".to_string());

        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| AnthropicMessage {
                role: match m.role {
                    ChatRole::User => "user".to_string(),
                    ChatRole::Assistant => "assistant".to_string(),
                    ChatRole::System => unreachable!("system messages filtered above"),
                },
                content: m.content.clone(),
            })
            .collect();

        let api_request = AnthropicRequest {
            model: model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: request.system,
            temperature: request.temperature,
        };

        let url = format!("{}/v1/messages", self.base_url());
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::provider(true, ProviderErrorKind::Other, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider(true, ProviderErrorKind::Other, e.to_string()))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(classify_status_error(
                    status,
                    &format!("{}: {}", err.error.error_type, err.error.message),
                ));
            }
            return Err(classify_status_error(status, &body));
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| Error::judgement(format!("failed to parse Anthropic response: {e}")))?;

        let content = api_response
            .content
            .iter()
            .filter_map(|c| c.text.as_ref())
            .cloned()
            .collect::<Vec<_>>()
            .join("");

        let usage = TokenUsage {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
            cache_read_tokens: api_response.usage.cache_read_input_tokens,
        };

        let model_spec = self
            .available_models()
            .into_iter()
            .find(|m| m.id == model)
            .unwrap_or_else(ModelSpec::claude_sonnet);
        let cost = model_spec.calculate_cost(usage.input_tokens, usage.output_tokens);

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            usage,
            timestamp: Utc::now(),
            cost: Some(cost),
            logprobs: None, // Anthropic does not return decision-token logprobs
            downgraded: false,
        })
    }

    async fn poll(&self, _handle: &BatchHandle) -> Result<BatchStatus> {
        Err(Error::internal(
            "AnthropicClient has no native batch API; use the default submit_batch fallback",
        ))
    }

    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.available_models()
            .into_iter()
            .find(|m| m.id == model)
            .unwrap_or_else(ModelSpec::claude_sonnet)
            .calculate_cost(input_tokens, output_tokens)
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn available_models(&self) -> Vec<ModelSpec> {
        vec![ModelSpec::claude_sonnet(), ModelSpec::claude_haiku()]
    }
}

// ---------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------

pub struct OpenAiClient {
    config: ClientConfig,
    http: Client,
}

impl OpenAiClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout_secs);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_logprobs: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    id: String,
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    logprobs: Option<OpenAiLogprobs>,
}

#[derive(Debug, Deserialize)]
struct OpenAiLogprobs {
    content: Option<Vec<OpenAiTokenLogprob>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiTokenLogprob {
    token: String,
    logprob: f64,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

#[async_trait]
impl LLMClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .or_else(|| self.config.default_model.clone())
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        let mut messages: Vec<OpenAiMessage> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OpenAiMessage {
            role: match m.role {
                ChatRole::System => "system".to_string(),
                ChatRole::User => "user".to_string(),
                ChatRole::Assistant => "assistant".to_string(),
            },
            content: m.content.clone(),
        }));

        let wants_logprobs = request.logprobs.is_some();
        let api_request = OpenAiRequest {
            model: model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            logprobs: wants_logprobs.then_some(true),
            top_logprobs: wants_logprobs.then_some(5),
        };

        let url = format!("{}/v1/chat/completions", self.base_url());
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::provider(true, ProviderErrorKind::Other, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider(true, ProviderErrorKind::Other, e.to_string()))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<OpenAiError>(&body) {
                return Err(classify_status_error(status, &err.error.message));
            }
            return Err(classify_status_error(status, &body));
        }

        let api_response: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|e| Error::judgement(format!("failed to parse OpenAI response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::judgement("OpenAI response had no choices"))?;

        let logprobs = request.logprobs.as_ref().and_then(|req| {
            let entries = choice.logprobs.as_ref()?.content.as_ref()?;
            let mut by_token = HashMap::new();
            for entry in entries {
                if req
                    .decision_tokens
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(entry.token.trim()))
                {
                    by_token.insert(entry.token.clone(), entry.logprob);
                }
            }
            (!by_token.is_empty()).then_some(TokenLogprobs { by_token })
        });

        let usage = TokenUsage {
            input_tokens: api_response.usage.prompt_tokens,
            output_tokens: api_response.usage.completion_tokens,
            cache_read_tokens: None,
        };

        let model_spec = self
            .available_models()
            .into_iter()
            .find(|m| m.id == model)
            .unwrap_or_else(ModelSpec::gpt4o_mini);
        let cost = model_spec.calculate_cost(usage.input_tokens, usage.output_tokens);

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content: choice.message.content,
            usage,
            timestamp: Utc::now(),
            cost: Some(cost),
            logprobs,
            downgraded: false,
        })
    }

    async fn poll(&self, _handle: &BatchHandle) -> Result<BatchStatus> {
        Err(Error::internal(
            "OpenAiClient has no native batch API; use the default submit_batch fallback",
        ))
    }

    fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.available_models()
            .into_iter()
            .find(|m| m.id == model)
            .unwrap_or_else(ModelSpec::gpt4o_mini)
            .calculate_cost(input_tokens, output_tokens)
    }

    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    fn available_models(&self) -> Vec<ModelSpec> {
        vec![ModelSpec::gpt4o(), ModelSpec::gpt4o_mini()]
    }
}
