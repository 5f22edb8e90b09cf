//! Bandit-style curriculum scheduler (§4.8 "Curriculum picking").

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::types::CurriculumState;
use crate::patterns::PatternLearner;
use crate::scenario::EvaluationScenario;

const PASS_RATE_HISTORY_CAPACITY: usize = 16;

/// Update `state` in place with this iteration's per-category pass rates,
/// recomputing smoothed learning progress and mastery flags.
///
/// `alpha` is the EMA smoothing factor (default 0.3); `mastery_threshold`
/// and consecutive-iteration count gate the mastery flag.
pub fn update_state(
    state: &mut CurriculumState,
    per_category_pass_rate: &HashMap<String, f64>,
    overall_pass_rate: f64,
    alpha: f64,
    mastery_threshold: f64,
) {
    for (category, &pass_rate) in per_category_pass_rate {
        let history = state
            .pass_rate_history
            .entry(category.clone())
            .or_insert_with(|| super::types::PassRateHistory::new(PASS_RATE_HISTORY_CAPACITY));
        let previous = history.latest();
        history.push(pass_rate);

        let td_error = previous.map(|prev| (pass_rate - prev).abs()).unwrap_or(0.0);
        let smoothed = state
            .learning_progress
            .get(category)
            .map(|&prev_lp| alpha * td_error + (1.0 - alpha) * prev_lp)
            .unwrap_or(td_error);
        state.learning_progress.insert(category.clone(), smoothed);

        let streak = state.mastery_streak.entry(category.clone()).or_insert(0);
        if pass_rate >= mastery_threshold {
            *streak += 1;
        } else {
            *streak = 0;
        }
        if *streak >= 2 {
            state.mastered.insert(category.clone());
        } else {
            state.mastered.remove(category);
        }
    }

    state.overall_pass_rate_history.push(overall_pass_rate);
    state.iteration += 1;
}

/// Deterministic pseudo-random draw in `(0, 1)` for `category` at
/// `iteration`, derived from a SHA-256 digest rather than an RNG crate —
/// the scheduler needs reproducible picks for tests and crash-replay, not
/// cryptographic randomness.
fn seeded_unit_interval(iteration: u32, category: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(iteration.to_le_bytes());
    hasher.update(category.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let value = u64::from_le_bytes(bytes);
    // Keep strictly inside (0, 1): `value.pow` never produces 0 here since
    // u64::MAX + 2 > 0, and dividing by a strictly larger denominator than
    // the numerator's max keeps the result below 1.
    (value as f64 + 1.0) / (u64::MAX as f64 + 2.0)
}

/// Compute the raw (unnormalised) sampling weight for `category` per
/// §4.8: `w_c = (1 - mastered_c) * (epsilon + LP_c + boost_c)`.
fn category_weight(
    state: &CurriculumState,
    category: &str,
    epsilon: f64,
    boost: f64,
) -> f64 {
    if state.mastered.contains(category) {
        return 0.0;
    }
    let lp = state.learning_progress.get(category).copied().unwrap_or(0.0);
    epsilon + lp + boost
}

/// Pick the iteration's scenario set: weighted sampling without
/// replacement over categories not yet mastered, respecting
/// `target_batch_size`. Returns an empty vec when every category is
/// mastered (the flywheel's termination check handles that case).
pub fn pick_curriculum(
    state: &CurriculumState,
    scenarios: &[EvaluationScenario],
    pattern_learner: &PatternLearner,
    epsilon: f64,
    pattern_boost: f64,
    target_batch_size: usize,
) -> Vec<EvaluationScenario> {
    let categories: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        scenarios
            .iter()
            .map(|s| s.category.clone())
            .filter(|c| seen.insert(c.clone()))
            .collect()
    };

    // Pattern boosts are expressed per scenario id; fold them into a
    // per-category boost by taking the max over the category's scenarios.
    let scenario_weights = pattern_learner.weighted_scenarios(
        &scenarios.iter().map(|s| (s.id.clone(), 0.0)).collect::<Vec<_>>(),
        pattern_boost,
    );
    let boost_by_scenario: HashMap<&str, f64> = scenario_weights
        .iter()
        .map(|(id, w)| (id.as_str(), *w))
        .collect();

    let mut category_boost: HashMap<&str, f64> = HashMap::new();
    for scenario in scenarios {
        let boost = boost_by_scenario.get(scenario.id.as_str()).copied().unwrap_or(0.0);
        let entry = category_boost.entry(scenario.category.as_str()).or_insert(0.0);
        *entry = entry.max(boost);
    }

    let weights: Vec<(String, f64)> = categories
        .iter()
        .map(|c| {
            let boost = category_boost.get(c.as_str()).copied().unwrap_or(0.0);
            (c.clone(), category_weight(state, c, epsilon, boost))
        })
        .filter(|(_, w)| *w > 0.0)
        .collect();

    if weights.is_empty() {
        return Vec::new();
    }

    // Efraimidis-Spirakis weighted sampling without replacement: draw a key
    // `u_c^(1/w_c)` per category from the deterministic seed and take the
    // categories with the largest keys. Equivalent in distribution to
    // repeatedly drawing from the renormalised remaining weights, but
    // needs no mutable RNG state and replays identically on crash recovery.
    let category_count = weights.len().min(target_batch_size.max(1));
    let mut keyed: Vec<(String, f64)> = weights
        .into_iter()
        .map(|(category, w)| {
            let u = seeded_unit_interval(state.iteration, &category);
            let key = u.powf(1.0 / w);
            (category, key)
        })
        .collect();
    keyed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let picked_categories: Vec<String> = keyed
        .into_iter()
        .take(category_count)
        .map(|(category, _)| category)
        .collect();

    scenarios
        .iter()
        .filter(|s| picked_categories.contains(&s.category))
        .cloned()
        .collect()
}
