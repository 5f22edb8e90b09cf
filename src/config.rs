//! Central configuration for the evaluation platform.
//!
//! Consolidates every tunable named in the platform contract into one
//! `serde`-deserialisable struct. All fields carry the documented defaults
//! so a caller can deserialise a partial JSON/TOML document and fall back
//! to `Config::default()` for anything it omits.

use serde::{Deserialize, Serialize};

fn default_rule_weight() -> f64 {
    0.4
}
fn default_llm_weight() -> f64 {
    0.6
}
fn default_confidence_threshold() -> f64 {
    0.3
}
fn default_verification_threshold() -> f64 {
    0.6
}
fn default_fast_track_ceiling() -> usize {
    50
}
fn default_fast_track_parallelism() -> usize {
    10
}
fn default_provider_retry_attempts() -> u32 {
    3
}
fn default_provider_retry_backoff_seconds() -> Vec<u64> {
    vec![1, 2, 4]
}
fn default_cost_ceiling_usd() -> f64 {
    10.0
}
fn default_model_downgrade_threshold_usd() -> f64 {
    5.0
}
fn default_max_iterations() -> u32 {
    30
}
fn default_pass_rate_target() -> f64 {
    0.91
}
fn default_plateau_delta() -> f64 {
    0.005
}
fn default_exploration_epsilon() -> f64 {
    0.05
}
fn default_mastery_threshold() -> f64 {
    0.95
}
fn default_pattern_overlap_threshold() -> f64 {
    0.5
}
fn default_scenario_pass_threshold() -> f64 {
    0.5
}
fn default_length_bias_threshold() -> f64 {
    0.3
}
fn default_style_bias_threshold() -> f64 {
    0.15
}
fn default_fast_track_timeout_secs() -> u64 {
    60
}
fn default_batch_poll_window_secs() -> u64 {
    30 * 60
}
fn default_provider_rate_limit_per_window() -> u32 {
    60
}
fn default_provider_rate_limit_window_secs() -> u64 {
    60
}

/// Every configuration option recognised by the platform, with its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_rule_weight")]
    pub rule_weight: f64,
    #[serde(default = "default_llm_weight")]
    pub llm_weight: f64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: f64,
    #[serde(default = "default_fast_track_ceiling")]
    pub fast_track_ceiling: usize,
    #[serde(default = "default_fast_track_parallelism")]
    pub fast_track_parallelism: usize,
    #[serde(default = "default_provider_retry_attempts")]
    pub provider_retry_attempts: u32,
    #[serde(default = "default_provider_retry_backoff_seconds")]
    pub provider_retry_backoff_seconds: Vec<u64>,
    #[serde(default = "default_cost_ceiling_usd")]
    pub cost_ceiling_usd: f64,
    #[serde(default = "default_model_downgrade_threshold_usd")]
    pub model_downgrade_threshold_usd: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_pass_rate_target")]
    pub pass_rate_target: f64,
    #[serde(default = "default_plateau_delta")]
    pub plateau_delta: f64,
    #[serde(default = "default_exploration_epsilon")]
    pub exploration_epsilon: f64,
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,
    /// Evidence-token Jaccard overlap threshold for pattern clustering (C7).
    /// Named only in prose by the platform contract; given an explicit
    /// default here since the recognised-options table omits it.
    #[serde(default = "default_pattern_overlap_threshold")]
    pub pattern_overlap_threshold: f64,
    /// Scenario-level pass threshold used when a scenario does not override it.
    #[serde(default = "default_scenario_pass_threshold")]
    pub scenario_pass_threshold: f64,
    #[serde(default = "default_length_bias_threshold")]
    pub length_bias_threshold: f64,
    #[serde(default = "default_style_bias_threshold")]
    pub style_bias_threshold: f64,
    #[serde(default = "default_fast_track_timeout_secs")]
    pub fast_track_timeout_secs: u64,
    #[serde(default = "default_batch_poll_window_secs")]
    pub batch_poll_window_secs: u64,
    /// Calls a single provider may receive per `provider_rate_limit_window_secs`
    /// before `ProviderRateLimiter::acquire` suspends the caller (§4.3).
    #[serde(default = "default_provider_rate_limit_per_window")]
    pub provider_rate_limit_per_window: u32,
    #[serde(default = "default_provider_rate_limit_window_secs")]
    pub provider_rate_limit_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rule_weight: default_rule_weight(),
            llm_weight: default_llm_weight(),
            confidence_threshold: default_confidence_threshold(),
            verification_threshold: default_verification_threshold(),
            fast_track_ceiling: default_fast_track_ceiling(),
            fast_track_parallelism: default_fast_track_parallelism(),
            provider_retry_attempts: default_provider_retry_attempts(),
            provider_retry_backoff_seconds: default_provider_retry_backoff_seconds(),
            cost_ceiling_usd: default_cost_ceiling_usd(),
            model_downgrade_threshold_usd: default_model_downgrade_threshold_usd(),
            max_iterations: default_max_iterations(),
            pass_rate_target: default_pass_rate_target(),
            plateau_delta: default_plateau_delta(),
            exploration_epsilon: default_exploration_epsilon(),
            mastery_threshold: default_mastery_threshold(),
            pattern_overlap_threshold: default_pattern_overlap_threshold(),
            scenario_pass_threshold: default_scenario_pass_threshold(),
            length_bias_threshold: default_length_bias_threshold(),
            style_bias_threshold: default_style_bias_threshold(),
            fast_track_timeout_secs: default_fast_track_timeout_secs(),
            batch_poll_window_secs: default_batch_poll_window_secs(),
            provider_rate_limit_per_window: default_provider_rate_limit_per_window(),
            provider_rate_limit_window_secs: default_provider_rate_limit_window_secs(),
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recognised_options_table() {
        let c = Config::default();
        assert_eq!(c.rule_weight, 0.4);
        assert_eq!(c.llm_weight, 0.6);
        assert_eq!(c.fast_track_ceiling, 50);
        assert_eq!(c.fast_track_parallelism, 10);
        assert_eq!(c.provider_retry_attempts, 3);
        assert_eq!(c.provider_retry_backoff_seconds, vec![1, 2, 4]);
        assert_eq!(c.cost_ceiling_usd, 10.0);
        assert_eq!(c.max_iterations, 30);
        assert_eq!(c.pass_rate_target, 0.91);
        assert_eq!(c.mastery_threshold, 0.95);
        assert_eq!(c.provider_rate_limit_per_window, 60);
        assert_eq!(c.provider_rate_limit_window_secs, 60);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let c = Config::from_json(r#"{"cost_ceiling_usd": 25.0}"#).unwrap();
        assert_eq!(c.cost_ceiling_usd, 25.0);
        assert_eq!(c.max_iterations, 30);
    }
}
