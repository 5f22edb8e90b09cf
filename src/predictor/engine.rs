//! Hybrid Reliability Predictor (C6): weighted fusion of the deterministic
//! rule engine (C4) and a calibrated LLM risk estimator.

use std::sync::Arc;

use serde::Deserialize;

use crate::compliance::RuleReport;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::judge::calibrate;
use crate::provider::{ChatMessage, CompletionRequest, LLMClient};
use tracing::{info, instrument, warn};

use super::digest::expand;
use super::types::{
    AnalysisDigest, BusinessImpact, LlmComponent, ReliabilityPrediction, RiskLevel, RuleComponent,
};

pub struct HybridPredictor {
    client: Arc<dyn LLMClient>,
    config: Config,
}

#[derive(Debug, Deserialize)]
struct LlmRiskWire {
    risk_score: f64,
    rationale: String,
}

impl HybridPredictor {
    pub fn new(client: Arc<dyn LLMClient>, config: Config) -> Self {
        Self { client, config }
    }

    fn build_prompt(digest: &AnalysisDigest, rule: &RuleReport) -> String {
        format!(
            "You are estimating the reliability risk of an AI agent configuration.\n\n\
             Deterministic compliance score (0=worst, 1=best): {rule_score:.3}\n\
             Compliance violations: {violations}\n\n\
             Evaluation digest:\n\
             - sample size: {sample_size}\n\
             - pass rate: {pass_rate:.3}\n\
             - framework distribution: {frameworks:?}\n\
             - tool-call distribution: {tools:?}\n\
             - mean latency (ms): {latency:?}\n\
             - recent error patterns: {errors:?}\n\n\
             Respond with ONLY a JSON object: \
             {{\"risk_score\": number between 0 (fully reliable) and 1 (unreliable), \"rationale\": string}}.",
            rule_score = rule.score,
            violations = rule.violations().len(),
            sample_size = digest.sample_size,
            pass_rate = digest.pass_rate,
            frameworks = digest.framework_counts,
            tools = digest.tool_call_counts,
            latency = digest.mean_latency_ms,
            errors = digest.visible_error_patterns(),
        )
    }

    async fn call_llm(&self, digest: &AnalysisDigest, rule: &RuleReport) -> Result<(f64, String, Option<f64>)> {
        let prompt = Self::build_prompt(digest, rule);
        let request = CompletionRequest::new()
            .with_temperature(0.0)
            .with_message(ChatMessage::user(prompt))
            .with_logprobs(vec!["0".to_string(), "1".to_string()]);

        let response = self.client.complete(request).await?;
        let object_start = response
            .content
            .find('{')
            .ok_or_else(|| Error::judgement("risk estimator response contained no JSON object"))?;
        let object_end = response
            .content
            .rfind('}')
            .ok_or_else(|| Error::judgement("risk estimator response contained no JSON object"))?;
        let wire: LlmRiskWire = serde_json::from_str(&response.content[object_start..=object_end])
            .map_err(|e| Error::judgement(format!("risk estimator response did not parse: {e}")))?;

        let logprob_margin = response.logprobs.as_ref().and_then(calibrate::confidence_from_logprobs);
        Ok((wire.risk_score.clamp(0.0, 1.0), wire.rationale, logprob_margin))
    }

    /// §4.6: fuse the rule report and an LLM risk estimate into a
    /// `ReliabilityPrediction`. Re-runs the LLM step once with an expanded
    /// digest if confidence remains below `confidence_threshold`; on a
    /// second low-confidence result, returns the prediction anyway with
    /// `low_confidence = true` rather than suppressing it.
    #[instrument(skip(self, rule, digest), fields(sample_size = digest.sample_size))]
    pub async fn predict(&self, rule: &RuleReport, digest: AnalysisDigest) -> Result<ReliabilityPrediction> {
        let (llm_score, rationale, logprob_margin) = self.call_llm(&digest, rule).await?;
        let mut confidence = Self::calibrate_confidence(logprob_margin, &digest);

        let (final_llm_score, final_rationale, low_confidence) =
            if confidence < self.config.confidence_threshold {
                info!(confidence, threshold = self.config.confidence_threshold, "low confidence, expanding digest and retrying");
                let expanded_digest = expand(digest.clone());
                let (retry_score, retry_rationale, retry_margin) =
                    self.call_llm(&expanded_digest, rule).await?;
                let retry_confidence = Self::calibrate_confidence(retry_margin, &expanded_digest);
                if retry_confidence >= self.config.confidence_threshold {
                    confidence = retry_confidence;
                    (retry_score, retry_rationale, false)
                } else {
                    warn!(retry_confidence, "still low confidence after retry, returning anyway");
                    confidence = retry_confidence;
                    (retry_score, retry_rationale, true)
                }
            } else {
                (llm_score, rationale, false)
            };

        // `rule.score` is a compliance score (1.0 = fully compliant). The
        // fusion law operates on risk in both components, so it is the
        // complement, not the raw compliance score, that gets weighted here.
        let rule_risk = 1.0 - rule.score;
        let combined_score = self.config.rule_weight * rule_risk + self.config.llm_weight * final_llm_score;
        let risk_level = RiskLevel::from_score(combined_score);

        Ok(ReliabilityPrediction {
            combined_score,
            risk_level,
            rule_component: RuleComponent {
                score: rule_risk,
                violation_count: rule.violations().len(),
                weight: self.config.rule_weight,
            },
            llm_component: LlmComponent {
                score: final_llm_score,
                rationale: final_rationale,
                weight: self.config.llm_weight,
            },
            confidence,
            business_impact: Self::estimate_business_impact(combined_score),
            low_confidence,
        })
    }

    /// Confidence is a function of (in order of preference): the logprob
    /// margin on the decision token when the provider returned one; digest
    /// completeness; and whether every observed framework was recognised.
    fn calibrate_confidence(logprob_margin: Option<f64>, digest: &AnalysisDigest) -> f64 {
        let base = logprob_margin.unwrap_or_else(|| digest.completeness());
        let framework_bonus = if digest.all_frameworks_recognised() { 0.1 } else { 0.0 };
        (base + framework_bonus).clamp(0.0, 1.0)
    }

    fn estimate_business_impact(combined_score: f64) -> BusinessImpact {
        // Crude, deliberately conservative linear mapping: a perfectly
        // reliable configuration (score 0) is credited with preventing all
        // anticipated failures; a maximally risky one (score 1) with none.
        BusinessImpact {
            failure_prevention_pct: Some(((1.0 - combined_score) * 100.0).clamp(0.0, 100.0)),
            cost_delta_usd: None,
        }
    }
}
