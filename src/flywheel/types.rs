//! Data model for the ACL Flywheel Controller (C8).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Ring-buffer of a category's recent pass rates, used by the bandit
/// scheduler's TD-error learning-progress estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRateHistory {
    capacity: usize,
    history: VecDeque<f64>,
}

impl PassRateHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: VecDeque::new(),
        }
    }

    pub fn push(&mut self, pass_rate: f64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(pass_rate);
    }

    pub fn latest(&self) -> Option<f64> {
        self.history.back().copied()
    }

    pub fn previous(&self) -> Option<f64> {
        if self.history.len() < 2 {
            return None;
        }
        self.history.get(self.history.len() - 2).copied()
    }

    pub fn consecutive_at_or_above(&self, threshold: f64, n: usize) -> bool {
        self.history.len() >= n && self.history.iter().rev().take(n).all(|&pr| pr >= threshold)
    }
}

/// Strategy focus areas an external `ImprovementStrategy` may tag itself
/// with (§6 "Strategy-provider interface").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusArea {
    Pii,
    Aml,
    Sox,
    Bias,
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub focus_area: FocusArea,
    pub rationale: String,
}

/// Owned exclusively by the controller; no other component mutates it
/// (§3 "Ownership").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumState {
    pub domain: String,
    pub iteration: u32,
    pub pass_rate_history: HashMap<String, PassRateHistory>,
    pub learning_progress: HashMap<String, f64>,
    pub mastered: std::collections::HashSet<String>,
    /// Consecutive iterations each category has held `PR_c ≥ mastery_threshold`.
    pub mastery_streak: HashMap<String, u32>,
    pub last_strategy: Option<StrategyRecord>,
    pub cumulative_cost_usd: f64,
    pub wall_clock_elapsed_secs: f64,
    /// Consecutive iterations with `|ΔPR| < plateau_delta`, tracked against
    /// the overall (not per-category) pass rate.
    pub plateau_streak: u32,
    pub overall_pass_rate_history: PassRateHistory,
}

impl CurriculumState {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            iteration: 0,
            pass_rate_history: HashMap::new(),
            learning_progress: HashMap::new(),
            mastered: std::collections::HashSet::new(),
            mastery_streak: HashMap::new(),
            last_strategy: None,
            cumulative_cost_usd: 0.0,
            wall_clock_elapsed_secs: 0.0,
            plateau_streak: 0,
            overall_pass_rate_history: PassRateHistory::new(16),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TargetReached,
    MaxIterations,
    Plateau,
    BudgetExceeded,
    Cancelled,
    FatalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub pass_rate: f64,
    pub categories_evaluated: Vec<String>,
    pub cost_usd: f64,
    pub strategy: Option<StrategyRecord>,
}

/// Final output of a flywheel run (§6 "Output contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlywheelReport {
    pub domain: String,
    pub iterations_run: u32,
    pub final_pass_rate: f64,
    pub termination_reason: TerminationReason,
    pub history: Vec<IterationRecord>,
    pub total_cost_usd: f64,
    pub mastered_categories: Vec<String>,
    /// Set when the run stopped on a fatal error between iterations rather
    /// than a clean termination condition (§7 "Propagation policy").
    pub incomplete: bool,
    pub error: Option<String>,
}
