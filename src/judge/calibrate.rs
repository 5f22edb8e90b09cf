//! Confidence calibration (§4.5 step 4).
//!
//! When the provider returned decision-token logprobs, confidence is the
//! softmax margin between the top two decision tokens. Otherwise — the
//! Open Question locked in DESIGN.md — confidence is derived from
//! agreement between the primary judgement and one additional sample at
//! temperature 0.7 (a self-consistency pass).

use crate::provider::TokenLogprobs;

/// Calibrate confidence from logprobs when available.
pub fn confidence_from_logprobs(logprobs: &TokenLogprobs) -> Option<f64> {
    logprobs.softmax_margin()
}

/// Self-consistency fallback: `confidence = 1.0 - |score - secondary_score|`.
/// Locked in as the fallback when logprobs are unavailable (DESIGN.md open
/// question #2).
pub fn self_consistency_confidence(score: f64, secondary_score: f64) -> f64 {
    (1.0 - (score - secondary_score).abs()).clamp(0.0, 1.0)
}
