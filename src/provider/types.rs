//! Wire types shared by every provider adapter: models, messages, requests,
//! responses, and cost accounting. Adapted from a multi-provider LLM client
//! library's request/response/cost-tracking shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Provider {
    Anthropic,
    OpenAI,
    #[cfg(feature = "gemini")]
    Google,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAI => write!(f, "openai"),
            #[cfg(feature = "gemini")]
            Self::Google => write!(f, "google"),
        }
    }
}

/// Model tier, used by the router's cost-downgrade decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Flagship = 0,
    Balanced = 1,
    Fast = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub tier: ModelTier,
    pub context_window: u32,
    pub max_output: u32,
    pub input_cost_per_m: f64,
    pub output_cost_per_m: f64,
    pub supports_logprobs: bool,
}

impl ModelSpec {
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input_cost_per_m;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output_cost_per_m;
        input_cost + output_cost
    }
}

impl ModelSpec {
    pub fn claude_sonnet() -> Self {
        Self {
            id: "claude-3-5-sonnet-20241022".to_string(),
            name: "Claude 3.5 Sonnet".to_string(),
            provider: Provider::Anthropic,
            tier: ModelTier::Balanced,
            context_window: 200_000,
            max_output: 8192,
            input_cost_per_m: 3.0,
            output_cost_per_m: 15.0,
            supports_logprobs: false,
        }
    }

    pub fn claude_haiku() -> Self {
        Self {
            id: "claude-3-5-haiku-20241022".to_string(),
            name: "Claude 3.5 Haiku".to_string(),
            provider: Provider::Anthropic,
            tier: ModelTier::Fast,
            context_window: 200_000,
            max_output: 8192,
            input_cost_per_m: 0.8,
            output_cost_per_m: 4.0,
            supports_logprobs: false,
        }
    }

    pub fn gpt4o() -> Self {
        Self {
            id: "gpt-4o".to_string(),
            name: "GPT-4o".to_string(),
            provider: Provider::OpenAI,
            tier: ModelTier::Balanced,
            context_window: 128_000,
            max_output: 16384,
            input_cost_per_m: 2.5,
            output_cost_per_m: 10.0,
            supports_logprobs: true,
        }
    }

    pub fn gpt4o_mini() -> Self {
        Self {
            id: "gpt-4o-mini".to_string(),
            name: "GPT-4o Mini".to_string(),
            provider: Provider::OpenAI,
            tier: ModelTier::Fast,
            context_window: 128_000,
            max_output: 16384,
            input_cost_per_m: 0.15,
            output_cost_per_m: 0.60,
            supports_logprobs: true,
        }
    }

    #[cfg(feature = "gemini")]
    pub fn gemini_1_5_pro() -> Self {
        Self {
            id: "gemini-1.5-pro".to_string(),
            name: "Gemini 1.5 Pro".to_string(),
            provider: Provider::Google,
            tier: ModelTier::Balanced,
            context_window: 2_000_000,
            max_output: 8192,
            input_cost_per_m: 1.25,
            output_cost_per_m: 5.00,
            supports_logprobs: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A request for a judgement-token logprobs breakdown at decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogprobsRequest {
    /// Substrings identifying the decision token(s) to request logprobs for,
    /// e.g. `["PASS", "FAIL"]`.
    pub decision_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub logprobs: Option<LogprobsRequest>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            model: None,
            system: None,
            messages: Vec::new(),
            max_tokens: None,
            temperature: None,
            logprobs: None,
            metadata: None,
        }
    }
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }
    pub fn with_logprobs(mut self, decision_tokens: Vec<String>) -> Self {
        self.logprobs = Some(LogprobsRequest { decision_tokens });
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: Option<u64>,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn effective_input_tokens(&self) -> u64 {
        let cache_read = self.cache_read_tokens.unwrap_or(0);
        self.input_tokens - cache_read + (cache_read / 10)
    }
}

/// Per-token logprobs for the requested decision tokens, when the provider
/// returned them. Never fabricated when the provider does not support them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLogprobs {
    /// `token -> logprob` for each requested decision token observed.
    pub by_token: HashMap<String, f64>,
}

impl TokenLogprobs {
    /// Softmax margin between the two highest-probability decision tokens,
    /// used as a confidence signal (§4.5 step 4).
    pub fn softmax_margin(&self) -> Option<f64> {
        let mut probs: Vec<f64> = self.by_token.values().map(|lp| lp.exp()).collect();
        if probs.len() < 2 {
            return None;
        }
        probs.sort_by(|a, b| b.partial_cmp(a).unwrap());
        let sum: f64 = probs.iter().sum();
        if sum <= 0.0 {
            return None;
        }
        Some((probs[0] - probs[1]) / sum)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    pub usage: TokenUsage,
    pub timestamp: DateTime<Utc>,
    pub cost: Option<f64>,
    pub logprobs: Option<TokenLogprobs>,
    /// True when the router substituted a cheaper model than the one
    /// originally requested because of the cost-downgrade threshold.
    pub downgraded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCosts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub request_count: u64,
}

/// Cost tracking for a process or run, with an enforced ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostTracker {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_read_tokens: u64,
    pub total_cost: f64,
    pub request_count: u64,
    pub by_model: HashMap<String, ModelCosts>,
    pub ceiling_usd: f64,
}

impl CostTracker {
    pub fn new(ceiling_usd: f64) -> Self {
        Self {
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_read_tokens: 0,
            total_cost: 0.0,
            request_count: 0,
            by_model: HashMap::new(),
            ceiling_usd,
        }
    }

    /// Record usage from a completion response, failing with
    /// `Error::cost_ceiling` instead of silently recording past the ceiling.
    pub fn record(
        &mut self,
        model: &str,
        usage: &TokenUsage,
        cost: Option<f64>,
    ) -> crate::error::Result<()> {
        let projected = self.total_cost + cost.unwrap_or(0.0);
        if projected > self.ceiling_usd {
            return Err(crate::error::Error::cost_ceiling(format!(
                "recording this call would bring cumulative cost to ${projected:.4}, exceeding the ${:.2} ceiling",
                self.ceiling_usd
            )));
        }

        self.total_input_tokens += usage.input_tokens;
        self.total_output_tokens += usage.output_tokens;
        self.total_cache_read_tokens += usage.cache_read_tokens.unwrap_or(0);
        self.request_count += 1;
        if let Some(c) = cost {
            self.total_cost += c;
        }

        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
        entry.request_count += 1;
        if let Some(c) = cost {
            entry.cost += c;
        }
        Ok(())
    }

    pub fn total_usd(&self) -> f64 {
        self.total_cost
    }

    pub fn remaining_usd(&self) -> f64 {
        (self.ceiling_usd - self.total_cost).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_cost_calculation() {
        let sonnet = ModelSpec::claude_sonnet();
        let cost = sonnet.calculate_cost(1_000_000, 500_000);
        assert!((cost - 10.5).abs() < 0.01);
    }

    #[test]
    fn cost_tracker_rejects_past_ceiling() {
        let mut tracker = CostTracker::new(1.0);
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 100,
            cache_read_tokens: None,
        };
        assert!(tracker.record("m", &usage, Some(0.5)).is_ok());
        assert!(tracker.record("m", &usage, Some(0.6)).is_err());
        assert!((tracker.total_cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn softmax_margin_prefers_clear_decisions() {
        let mut by_token = HashMap::new();
        by_token.insert("PASS".to_string(), -0.01_f64);
        by_token.insert("FAIL".to_string(), -5.0_f64);
        let lp = TokenLogprobs { by_token };
        let margin = lp.softmax_margin().unwrap();
        assert!(margin > 0.9);
    }
}
