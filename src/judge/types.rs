//! Data model for the Dual-Track Judge Engine (C5).

use serde::{Deserialize, Serialize};

/// Outcome of evaluating one (scenario, output) pair. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgementResult {
    pub scenario_id: String,
    pub output_id: String,
    pub passed: bool,
    pub score: f64,
    pub reward: f64,
    pub feedback: String,
    pub evidence: Vec<String>,
    pub confidence: f64,
    pub model_id: String,
    pub downgraded: bool,
    pub judgement_latency_ms: u64,
    pub evaluation_cost_usd: f64,
    /// True once a verification pass re-ran this judgement with a stronger
    /// model because the first pass's confidence fell below the threshold.
    pub verified: bool,
    pub track: Track,
}

impl JudgementResult {
    /// A sentinel result recorded when a scenario-level error is isolated
    /// rather than propagated — never aborts the surrounding run.
    pub fn sentinel_failed(scenario_id: impl Into<String>, output_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            output_id: output_id.into(),
            passed: false,
            score: 0.0,
            reward: -1.0,
            feedback: reason.into(),
            evidence: Vec::new(),
            confidence: 0.0,
            model_id: String::new(),
            downgraded: false,
            judgement_latency_ms: 0,
            evaluation_cost_usd: 0.0,
            verified: false,
            track: Track::Fast,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Fast,
    Batch,
}

/// Per-scenario evaluation state machine (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Queued,
    Dispatched,
    Succeeded,
    Verifying,
    Verified,
    Failed,
}

impl ScenarioState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScenarioState::Succeeded | ScenarioState::Verified | ScenarioState::Failed)
    }
}

/// Parsed judge-model output before confidence calibration and evidence
/// cross-checking are applied.
#[derive(Debug, Clone)]
pub struct ParsedJudgement {
    pub passed: bool,
    pub score: f64,
    pub feedback: String,
    pub evidence: Vec<String>,
    pub reward: f64,
}

/// Post-hoc bias diagnostics computed over a full result set. Never mutate
/// the judgements they describe.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BiasDiagnostics {
    pub length_bias_correlation: Option<f64>,
    pub length_bias_flagged: bool,
    pub style_bias_std: Option<f64>,
    pub style_bias_flagged: bool,
}

/// Aggregate outcome of one `evaluate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub results: Vec<JudgementResult>,
    pub pass_rate: f64,
    pub per_severity_counts: std::collections::HashMap<String, usize>,
    pub per_category_pass_rate: std::collections::HashMap<String, f64>,
    pub bias: BiasDiagnostics,
    pub track_used: Track,
    pub total_cost_usd: f64,
}
