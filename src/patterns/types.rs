//! Data model for the Pattern Learner & Scenario Bank (C7).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A cluster of failures sharing scenario category, framework, and
/// evidence-token overlap above the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub category: String,
    pub framework: String,
    pub scenario_ids: Vec<String>,
    pub representative_tokens: Vec<String>,
    /// Number of times this cluster (or a sufficiently overlapping one) has
    /// been observed across iterations.
    pub count: u32,
}

impl Pattern {
    pub fn token_set(&self) -> HashSet<&str> {
        self.representative_tokens.iter().map(String::as_str).collect()
    }
}
