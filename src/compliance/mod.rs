//! Compliance Rule Engine (C4): a pure-function evaluator over an agent
//! configuration. Deterministic — identical config produces an identical
//! report. No suspension points, no provider calls.

use serde::{Deserialize, Serialize};

#[cfg(test)]
mod proptest;

/// The agent configuration under evaluation. Only the fields the four
/// checks inspect are modelled; unrecognised fields are simply absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    pub has_pii_detection: bool,
    pub has_data_protection_section: bool,
    pub has_input_validation: bool,
    pub has_access_control: bool,
    pub has_encryption_flag: bool,
    pub has_audit_logging: bool,
    pub has_approval_workflow_for_value_actions: bool,
    pub retention_policy_set: bool,
    pub has_encryption_at_rest: bool,
    pub has_encryption_in_transit: bool,
    pub has_data_classification: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    PiiProtection,
    SecurityControls,
    AuditRequirements,
    DataHandling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: crate::scenario::Severity,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub violations: Vec<Violation>,
    pub sub_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleReport {
    pub pii_protection: CheckOutcome,
    pub security_controls: CheckOutcome,
    pub audit_requirements: CheckOutcome,
    pub data_handling: CheckOutcome,
    /// Severity-weighted mean of the four sub-scores.
    pub score: f64,
}

impl RuleReport {
    pub fn violations(&self) -> Vec<&Violation> {
        self.pii_protection
            .violations
            .iter()
            .chain(self.security_controls.violations.iter())
            .chain(self.audit_requirements.violations.iter())
            .chain(self.data_handling.violations.iter())
            .collect()
    }
}

fn check_pii_protection(config: &AgentConfig) -> CheckOutcome {
    let mut violations = Vec::new();
    if !config.has_pii_detection {
        violations.push(Violation {
            kind: ViolationKind::PiiProtection,
            severity: crate::scenario::Severity::Critical,
            evidence: "no PII-detection/masking tool configured".to_string(),
        });
    }
    if !config.has_data_protection_section {
        violations.push(Violation {
            kind: ViolationKind::PiiProtection,
            severity: crate::scenario::Severity::High,
            evidence: "no `data_protection` section configured".to_string(),
        });
    }
    CheckOutcome {
        sub_score: if violations.is_empty() { 1.0 } else { 0.0 },
        violations,
    }
}

fn check_security_controls(config: &AgentConfig) -> CheckOutcome {
    let mut violations = Vec::new();
    if !config.has_input_validation {
        violations.push(Violation {
            kind: ViolationKind::SecurityControls,
            severity: crate::scenario::Severity::High,
            evidence: "no input validation configured".to_string(),
        });
    }
    if !config.has_access_control {
        violations.push(Violation {
            kind: ViolationKind::SecurityControls,
            severity: crate::scenario::Severity::Critical,
            evidence: "no access control configured".to_string(),
        });
    }
    if !config.has_encryption_flag {
        violations.push(Violation {
            kind: ViolationKind::SecurityControls,
            severity: crate::scenario::Severity::High,
            evidence: "no encryption flag set".to_string(),
        });
    }
    CheckOutcome {
        sub_score: if violations.is_empty() { 1.0 } else { 0.0 },
        violations,
    }
}

fn check_audit_requirements(config: &AgentConfig) -> CheckOutcome {
    let mut violations = Vec::new();
    if !config.has_audit_logging {
        violations.push(Violation {
            kind: ViolationKind::AuditRequirements,
            severity: crate::scenario::Severity::High,
            evidence: "no audit logging configured".to_string(),
        });
    }
    if !config.has_approval_workflow_for_value_actions {
        violations.push(Violation {
            kind: ViolationKind::AuditRequirements,
            severity: crate::scenario::Severity::Medium,
            evidence: "no approval workflow for value-threshold actions".to_string(),
        });
    }
    if !config.retention_policy_set {
        violations.push(Violation {
            kind: ViolationKind::AuditRequirements,
            severity: crate::scenario::Severity::Medium,
            evidence: "retention policy unset".to_string(),
        });
    }
    CheckOutcome {
        sub_score: if violations.is_empty() { 1.0 } else { 0.0 },
        violations,
    }
}

fn check_data_handling(config: &AgentConfig) -> CheckOutcome {
    let mut violations = Vec::new();
    if !config.has_encryption_at_rest || !config.has_encryption_in_transit {
        violations.push(Violation {
            kind: ViolationKind::DataHandling,
            severity: crate::scenario::Severity::Critical,
            evidence: "missing encryption at rest and/or in transit".to_string(),
        });
    }
    if !config.has_data_classification {
        violations.push(Violation {
            kind: ViolationKind::DataHandling,
            severity: crate::scenario::Severity::Medium,
            evidence: "no data classification configured".to_string(),
        });
    }
    CheckOutcome {
        sub_score: if violations.is_empty() { 1.0 } else { 0.0 },
        violations,
    }
}

/// Severity-weighted mean over the four checks' worst violation severity,
/// falling back to the sub-score itself when a check has no violations.
fn aggregate_score(checks: &[&CheckOutcome]) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for check in checks {
        let weight = check
            .violations
            .iter()
            .map(|v| v.severity.weight())
            .fold(0.0_f64, f64::max);
        let weight = if weight == 0.0 { 1.0 } else { weight };
        weighted_sum += check.sub_score * weight;
        weight_total += weight;
    }
    if weight_total == 0.0 {
        1.0
    } else {
        weighted_sum / weight_total
    }
}

/// Independently checks PII protection, security controls, audit
/// requirements, and data handling, then aggregates into a severity-weighted
/// rule score.
pub fn check_all(config: &AgentConfig) -> RuleReport {
    let pii_protection = check_pii_protection(config);
    let security_controls = check_security_controls(config);
    let audit_requirements = check_audit_requirements(config);
    let data_handling = check_data_handling(config);

    let score = aggregate_score(&[
        &pii_protection,
        &security_controls,
        &audit_requirements,
        &data_handling,
    ]);

    RuleReport {
        pii_protection,
        security_controls,
        audit_requirements,
        data_handling,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fully_compliant() -> AgentConfig {
        AgentConfig {
            has_pii_detection: true,
            has_data_protection_section: true,
            has_input_validation: true,
            has_access_control: true,
            has_encryption_flag: true,
            has_audit_logging: true,
            has_approval_workflow_for_value_actions: true,
            retention_policy_set: true,
            has_encryption_at_rest: true,
            has_encryption_in_transit: true,
            has_data_classification: true,
        }
    }

    #[test]
    fn fully_compliant_config_scores_one() {
        let report = check_all(&fully_compliant());
        assert_eq!(report.score, 1.0);
        assert!(report.violations().is_empty());
    }

    #[test]
    fn missing_pii_detection_is_flagged_critical() {
        let mut config = fully_compliant();
        config.has_pii_detection = false;
        let report = check_all(&config);
        assert!(report
            .pii_protection
            .violations
            .iter()
            .any(|v| v.severity == crate::scenario::Severity::Critical));
        assert!(report.score < 1.0);
    }

    #[test]
    fn identical_config_produces_identical_report() {
        let config = fully_compliant();
        let a = check_all(&config);
        let b = check_all(&config);
        assert_eq!(a.score, b.score);
        assert_eq!(a.violations().len(), b.violations().len());
    }

    #[test]
    fn bare_default_config_is_maximally_non_compliant() {
        let report = check_all(&AgentConfig::default());
        assert!(report.score < 0.5);
        assert!(!report.violations().is_empty());
    }
}
