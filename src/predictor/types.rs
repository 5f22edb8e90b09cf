//! Data model for the Hybrid Reliability Predictor (C6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map a combined risk score to its level per the §3 thresholds:
    /// LOW ≤0.4, MEDIUM ≤0.7, HIGH >0.7.
    pub fn from_score(score: f64) -> Self {
        if score <= 0.4 {
            RiskLevel::Low
        } else if score <= 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleComponent {
    pub score: f64,
    pub violation_count: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmComponent {
    pub score: f64,
    pub rationale: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessImpact {
    pub failure_prevention_pct: Option<f64>,
    pub cost_delta_usd: Option<f64>,
}

/// Outcome of C6's `predict` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityPrediction {
    pub combined_score: f64,
    pub risk_level: RiskLevel,
    pub rule_component: RuleComponent,
    pub llm_component: LlmComponent,
    pub confidence: f64,
    pub business_impact: BusinessImpact,
    /// Set when confidence remained below `confidence_threshold` even after
    /// the one permitted re-run with an expanded digest (§4.6 step 6).
    /// Never suppresses the prediction — it is still returned.
    pub low_confidence: bool,
}

/// Error patterns beyond this count are omitted from the prompt unless the
/// digest has been [`expand`](super::digest::expand)ed, in which case every
/// pattern is surfaced.
pub const ERROR_PATTERN_PROMPT_LIMIT: usize = 5;

/// Summary of evaluation output fed into the LLM risk estimator: framework
/// distribution, tool-usage patterns, error patterns, aggregate performance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisDigest {
    pub framework_counts: std::collections::HashMap<String, usize>,
    pub tool_call_counts: std::collections::HashMap<String, usize>,
    pub error_patterns: Vec<String>,
    pub mean_latency_ms: Option<f64>,
    pub pass_rate: f64,
    pub sample_size: usize,
    /// True once the digest has been expanded for the low-confidence re-run.
    pub expanded: bool,
}

impl AnalysisDigest {
    /// The error patterns actually surfaced to the LLM: capped at
    /// [`ERROR_PATTERN_PROMPT_LIMIT`] unless the digest has been expanded,
    /// in which case the full list is surfaced.
    pub fn visible_error_patterns(&self) -> &[String] {
        if self.expanded || self.error_patterns.len() <= ERROR_PATTERN_PROMPT_LIMIT {
            &self.error_patterns
        } else {
            &self.error_patterns[..ERROR_PATTERN_PROMPT_LIMIT]
        }
    }

    /// Crude completeness signal used by the confidence formula: how much
    /// of the digest's optional detail is actually populated, plus how much
    /// of the observed error patterns were actually surfaced to the LLM
    /// (truncation on the first pass is itself a source of uncertainty the
    /// expanded re-run is meant to close).
    pub fn completeness(&self) -> f64 {
        let mut present = 0.0;
        let mut total = 0.0;
        for populated in [
            !self.framework_counts.is_empty(),
            !self.tool_call_counts.is_empty(),
            self.mean_latency_ms.is_some(),
        ] {
            total += 1.0;
            if populated {
                present += 1.0;
            }
        }

        total += 1.0;
        if self.error_patterns.is_empty() {
            // Nothing to truncate, so this component contributes nothing
            // either way.
        } else {
            present += self.visible_error_patterns().len() as f64 / self.error_patterns.len() as f64;
        }

        if total == 0.0 {
            0.0
        } else {
            present / total
        }
    }

    /// True when every framework seen is a recognised (non-`Other`) tag.
    pub fn all_frameworks_recognised(&self) -> bool {
        !self.framework_counts.keys().any(|k| k == "other" || k.is_empty())
    }
}
