//! Property-based tests for the Hybrid Reliability Predictor's fusion law
//! and risk-level thresholds (§4.6, §3).

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::config::Config;
    use crate::predictor::RiskLevel;

    fn unit() -> impl Strategy<Value = f64> {
        0.0f64..=1.0f64
    }

    proptest! {
        /// The fusion law `combined = rule_weight * rule_risk + llm_weight * llm_score`
        /// always lands in [0, 1] when both inputs do and the weights sum to 1,
        /// matching the configured defaults (§4.6).
        #[test]
        fn fusion_of_unit_inputs_stays_in_unit_range(rule_risk in unit(), llm_score in unit()) {
            let config = Config::default();
            prop_assert!((config.rule_weight + config.llm_weight - 1.0).abs() < 1e-9);
            let combined = config.rule_weight * rule_risk + config.llm_weight * llm_score;
            prop_assert!(combined >= 0.0 && combined <= 1.0, "combined {} out of range", combined);
        }

        /// Raising either input while holding the other fixed never lowers
        /// the combined score.
        #[test]
        fn fusion_is_monotone_in_each_input(rule_risk in unit(), llm_score in unit(), delta in 0.0f64..=0.3f64) {
            let config = Config::default();
            let base = config.rule_weight * rule_risk + config.llm_weight * llm_score;
            let raised_rule_risk = (rule_risk + delta).min(1.0);
            let raised = config.rule_weight * raised_rule_risk + config.llm_weight * llm_score;
            prop_assert!(raised >= base - 1e-9);
        }

        /// `RiskLevel::from_score` partitions [0, 1] into three contiguous,
        /// non-overlapping bands ordered Low < Medium < High as the score rises.
        #[test]
        fn risk_level_is_monotone_non_decreasing_with_score(a in unit(), b in unit()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo_level = RiskLevel::from_score(lo);
            let hi_level = RiskLevel::from_score(hi);
            let rank = |l: RiskLevel| match l {
                RiskLevel::Low => 0,
                RiskLevel::Medium => 1,
                RiskLevel::High => 2,
            };
            prop_assert!(rank(lo_level) <= rank(hi_level));
        }
    }
}
