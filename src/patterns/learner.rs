//! Pattern Learner & Scenario Bank (C7).
//!
//! A one-way observer over judgement results: it never calls back into the
//! judge engine or the flywheel controller (§9 "cycles between components
//! ... linearise"). It feeds weight snapshots to whoever asks for them via
//! `weighted_scenarios`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::Result;
use crate::judge::JudgementResult;
use crate::normaliser::NormalisedOutput;
use crate::persistence::PatternStore;
use crate::scenario::EvaluationScenario;

use super::types::Pattern;

/// A known cluster of failures, re-observed on subsequent iterations
/// exceeds this many occurrences before it earns a sampling-weight boost.
pub const PATTERN_FREQUENCY_THRESHOLD: u32 = 2;

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub struct PatternLearner {
    overlap_threshold: f64,
    patterns: Mutex<Vec<(Pattern, HashSet<String>)>>,
}

impl PatternLearner {
    pub fn new(overlap_threshold: f64) -> Self {
        Self {
            overlap_threshold,
            patterns: Mutex::new(Vec::new()),
        }
    }

    /// Observe a batch of judgement results, clustering failures by
    /// (category, framework, evidence-token overlap ≥ θ). Re-observing a
    /// known pattern increments its count rather than creating a duplicate.
    ///
    /// When `store` is given, every touched pattern is upserted into it
    /// immediately (§4.7 "patterns are persisted; re-observing a known
    /// pattern increments its count") — this is the learner's only write
    /// to anything outside its own process memory, and it never reads the
    /// store back mid-run (see [`PatternLearner::hydrate_from_store`] for
    /// the resume-time read).
    pub fn observe(
        &self,
        results: &[JudgementResult],
        scenarios: &[EvaluationScenario],
        outputs: &[NormalisedOutput],
        store: Option<&PatternStore>,
    ) -> Result<()> {
        let scenario_by_id: HashMap<&str, &EvaluationScenario> =
            scenarios.iter().map(|s| (s.id.as_str(), s)).collect();
        let output_by_id: HashMap<&str, &NormalisedOutput> =
            outputs.iter().map(|o| (o.id.as_str(), o)).collect();

        let mut patterns = self.patterns.lock().unwrap();

        for result in results.iter().filter(|r| !r.passed) {
            let Some(scenario) = scenario_by_id.get(result.scenario_id.as_str()) else {
                continue;
            };
            let framework = output_by_id
                .get(result.output_id.as_str())
                .map(|o| o.framework.to_string())
                .unwrap_or_else(|| "generic".to_string());

            let mut tokens: HashSet<String> = HashSet::new();
            for evidence in &result.evidence {
                tokens.extend(tokenize(evidence));
            }
            if tokens.is_empty() {
                tokens.extend(tokenize(&result.feedback));
            }

            let matched = patterns.iter_mut().find(|(p, token_set)| {
                p.category == scenario.category
                    && p.framework == framework
                    && jaccard(token_set, &tokens) >= self.overlap_threshold
            });

            let touched = match matched {
                Some((pattern, token_set)) => {
                    pattern.count += 1;
                    if !pattern.scenario_ids.contains(&scenario.id) {
                        pattern.scenario_ids.push(scenario.id.clone());
                    }
                    token_set.extend(tokens);
                    pattern.representative_tokens = token_set.iter().cloned().collect();
                    pattern.clone()
                }
                None => {
                    let pattern = Pattern {
                        id: format!("pattern_{}_{}", scenario.category, patterns.len()),
                        category: scenario.category.clone(),
                        framework,
                        scenario_ids: vec![scenario.id.clone()],
                        representative_tokens: tokens.iter().cloned().collect(),
                        count: 1,
                    };
                    patterns.push((pattern.clone(), tokens));
                    pattern
                }
            };

            if let Some(store) = store {
                store.upsert(&touched)?;
            }
        }
        Ok(())
    }

    /// Load patterns already persisted in `store` (from a prior run of the
    /// same process, or a crash-recovered one) into this learner's
    /// in-memory set, skipping ids it already knows about. Called once at
    /// flywheel resume so C7 state survives a restart the same way
    /// curriculum state does (§4.8 "Crash recovery").
    pub fn hydrate_from_store(&self, store: &PatternStore) -> Result<()> {
        let existing = store.all()?;
        let mut patterns = self.patterns.lock().unwrap();
        for pattern in existing {
            if patterns.iter().any(|(p, _)| p.id == pattern.id) {
                continue;
            }
            let token_set: HashSet<String> = pattern.representative_tokens.iter().cloned().collect();
            patterns.push((pattern, token_set));
        }
        Ok(())
    }

    /// Patterns whose frequency has crossed `PATTERN_FREQUENCY_THRESHOLD`.
    pub fn emerging_patterns(&self) -> Vec<Pattern> {
        self.patterns
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.count >= PATTERN_FREQUENCY_THRESHOLD)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Merge `base` per-scenario weights with a positive boost for
    /// scenarios belonging to an emerging pattern, scaled by
    /// `pattern_boost` and the pattern's observed frequency.
    pub fn weighted_scenarios(
        &self,
        base: &[(String, f64)],
        pattern_boost: f64,
    ) -> Vec<(String, f64)> {
        let emerging = self.emerging_patterns();
        let mut boost_by_scenario: HashMap<&str, f64> = HashMap::new();
        for pattern in &emerging {
            for scenario_id in &pattern.scenario_ids {
                let entry = boost_by_scenario.entry(scenario_id.as_str()).or_insert(0.0);
                *entry += pattern_boost * pattern.count as f64;
            }
        }

        base.iter()
            .map(|(id, weight)| {
                let boost = boost_by_scenario.get(id.as_str()).copied().unwrap_or(0.0);
                (id.clone(), weight + boost)
            })
            .collect()
    }
}
