//! Scenario data model (C2).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the compliance rule engine's severity-weighted mean.
    pub fn weight(self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::High => 0.75,
            Severity::Medium => 0.5,
            Severity::Low => 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Negative,
    Positive,
    Adversarial,
}

/// A single compliance scenario. Ids are globally unique within a domain
/// version and stable across releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationScenario {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub category: String,
    pub test_type: TestType,
    pub expected_behaviour: String,
    #[serde(default)]
    pub failure_indicators: Vec<String>,
    #[serde(default)]
    pub remediation: String,
    #[serde(default)]
    pub compliance_frameworks: Vec<String>,
    /// Scenario-level override of the default pass threshold (0.5).
    #[serde(default)]
    pub pass_threshold: Option<f64>,
    /// Unknown fields preserved but ignored by core logic.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl EvaluationScenario {
    pub fn pass_threshold(&self, default_threshold: f64) -> f64 {
        self.pass_threshold.unwrap_or(default_threshold)
    }
}

/// A versioned, domain-scoped collection of scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioBundle {
    pub domain: String,
    pub version: String,
    pub scenarios: Vec<EvaluationScenario>,
}

impl ScenarioBundle {
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
