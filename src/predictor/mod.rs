//! Hybrid Reliability Predictor (C6): weighted fusion of the deterministic
//! compliance rule engine and a calibrated LLM risk estimator.

pub mod digest;
pub mod engine;
pub mod types;

#[cfg(test)]
mod proptest;

pub use digest::build_digest;
pub use engine::HybridPredictor;
pub use types::{
    AnalysisDigest, BusinessImpact, LlmComponent, ReliabilityPrediction, RiskLevel, RuleComponent,
};
