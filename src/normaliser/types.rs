//! Canonical trace types produced by the normaliser (C1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An input record before normalisation: either a bare response string or a
/// framework-specific mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
    String(String),
    Mapping(serde_json::Map<String, Value>),
}

/// Detected agent framework. An open enum with a `Generic` fallback and an
/// `Other` escape hatch, rather than duck-typed string matching downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkTag {
    LangChain,
    CrewAi,
    OpenAi,
    Anthropic,
    Generic,
    Other(String),
}

impl std::fmt::Display for FrameworkTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameworkTag::LangChain => write!(f, "langchain"),
            FrameworkTag::CrewAi => write!(f, "crewai"),
            FrameworkTag::OpenAi => write!(f, "openai"),
            FrameworkTag::Anthropic => write!(f, "anthropic"),
            FrameworkTag::Generic => write!(f, "generic"),
            FrameworkTag::Other(tag) => write!(f, "{tag}"),
        }
    }
}

/// One step of a structured agent trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub kind: TraceStepKind,
    pub payload: Value,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStepKind {
    Reasoning,
    ToolCall,
    ToolResult,
}

/// Latency/token/cost metrics attached to an output, when available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub latency_ms: Option<u64>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

/// The canonical unit fed into evaluation. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalisedOutput {
    pub id: String,
    pub response: String,
    pub scenario_affinity: Option<String>,
    pub framework: FrameworkTag,
    pub trace: Option<Vec<TraceStep>>,
    pub metrics: Option<PerformanceMetrics>,
    pub created_at: DateTime<Utc>,
}

impl NormalisedOutput {
    /// Construct a `NormalisedOutput`, enforcing the non-empty-response invariant.
    pub fn new(
        id: impl Into<String>,
        response: impl Into<String>,
        framework: FrameworkTag,
    ) -> crate::error::Result<Self> {
        let response = response.into();
        if response.trim().is_empty() {
            return Err(crate::error::Error::input(
                "normalised response text must be non-empty",
            ));
        }
        Ok(Self {
            id: id.into(),
            response,
            scenario_affinity: None,
            framework,
            trace: None,
            metrics: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_scenario_affinity(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_affinity = Some(scenario_id.into());
        self
    }

    pub fn with_trace(mut self, trace: Vec<TraceStep>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
