//! Provider Adapter (C3): unified call surface to LLM providers with cost
//! accounting, rate limiting, and retry/backoff.

pub mod batch;
pub mod client;
pub mod router;
pub mod types;

pub use batch::{ProviderRateLimiter, RetryConfig};
pub use client::{
    AnthropicClient, BatchHandle, BatchJob, BatchResult, BatchStatus, ClientConfig, LLMClient,
    OpenAiClient,
};
pub use router::ModelRouter;
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, CostTracker, LogprobsRequest,
    ModelSpec, ModelTier, Provider, TokenLogprobs, TokenUsage,
};
