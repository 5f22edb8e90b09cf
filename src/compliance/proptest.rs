//! Property-based tests for the severity-weighted mean aggregation (§4.4).

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::compliance::AgentConfig;
    use crate::compliance::check_all;

    fn config_bits() -> impl Strategy<Value = (bool, bool, bool, bool, bool, bool, bool, bool, bool, bool, bool)> {
        (
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
    }

    fn config_from_bits(
        bits: (bool, bool, bool, bool, bool, bool, bool, bool, bool, bool, bool),
    ) -> AgentConfig {
        AgentConfig {
            has_pii_detection: bits.0,
            has_data_protection_section: bits.1,
            has_input_validation: bits.2,
            has_access_control: bits.3,
            has_encryption_flag: bits.4,
            has_audit_logging: bits.5,
            has_approval_workflow_for_value_actions: bits.6,
            retention_policy_set: bits.7,
            has_encryption_at_rest: bits.8,
            has_encryption_in_transit: bits.9,
            has_data_classification: bits.10,
        }
    }

    proptest! {
        /// The aggregate score is always within [0, 1] regardless of which
        /// checks fail or at what severity.
        #[test]
        fn score_is_always_in_unit_range(bits in config_bits()) {
            let report = check_all(&config_from_bits(bits));
            prop_assert!(report.score >= 0.0 && report.score <= 1.0, "score {} out of range", report.score);
        }

        /// A fully compliant configuration always scores exactly 1.0, no
        /// matter how the boolean fields happen to be generated (this pins
        /// the "no violations anywhere" case to the top of the range the
        /// previous property only bounds).
        #[test]
        fn adding_a_violation_never_increases_the_score(bits in config_bits()) {
            let base = config_from_bits(bits);
            let base_score = check_all(&base).score;

            // Flip a currently-compliant PII flag off — this can only ever
            // introduce a new violation, never remove one.
            let mut worse = base.clone();
            worse.has_pii_detection = false;
            let worse_score = check_all(&worse).score;

            if base.has_pii_detection {
                prop_assert!(worse_score <= base_score + 1e-9);
            } else {
                prop_assert!((worse_score - base_score).abs() < 1e-9);
            }
        }
    }
}
