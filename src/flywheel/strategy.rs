//! Strategy-provider interface (§6 "External interfaces"): the flywheel
//! controller asks an external collaborator what to change next rather
//! than embedding improvement logic itself, mirroring the teacher's
//! `FallbackExtractor`/`ExtractResponse` closure seam in `orchestrator.rs`.

use async_trait::async_trait;

use crate::error::Result;
use crate::judge::{EvaluationSummary, JudgementResult};
use crate::normaliser::NormalisedOutput;

use super::types::{CurriculumState, FocusArea};

/// Read-only view of the controller's curriculum state, handed to a
/// strategy provider so it can reason about per-category progress without
/// being able to mutate the state the controller exclusively owns.
pub type CurriculumSnapshot = CurriculumState;

/// Alias kept distinct from `EvaluationSummary` at the call site so the
/// trait signature reads as the platform contract names it, even though
/// the concrete type is the judge engine's own aggregate.
pub type Summary = EvaluationSummary;

#[derive(Debug, Clone)]
pub struct ImprovementStrategy {
    pub focus_area: FocusArea,
    pub rationale: String,
}

/// External collaborator the flywheel controller consults once per
/// iteration that does not hit its target pass rate. Kept as a trait, not a
/// concrete type, so the platform's own strategies (prompt edits, RAG
/// grounding, guardrail insertion) live outside this crate.
#[async_trait]
pub trait StrategyProvider: Send + Sync {
    async fn choose(&self, state: &CurriculumSnapshot, summary: &Summary) -> Result<ImprovementStrategy>;

    /// Apply the chosen strategy to the outputs that will be judged again
    /// next iteration. Synchronous by design — the strategy has already
    /// made whatever calls it needed inside `choose`.
    fn apply(
        &self,
        strategy: &ImprovementStrategy,
        outputs: &[NormalisedOutput],
        results: &[JudgementResult],
    ) -> Vec<NormalisedOutput>;
}

/// Deterministic test double for the flywheel's own tests: always proposes
/// the same focus area and leaves outputs untouched, matching the
/// teacher's `MockValidator`-style fixed-response test doubles.
pub struct ScriptedStrategyProvider {
    pub focus_area: FocusArea,
    pub rationale: String,
}

impl ScriptedStrategyProvider {
    pub fn new(focus_area: FocusArea, rationale: impl Into<String>) -> Self {
        Self {
            focus_area,
            rationale: rationale.into(),
        }
    }
}

#[async_trait]
impl StrategyProvider for ScriptedStrategyProvider {
    async fn choose(&self, _state: &CurriculumSnapshot, _summary: &Summary) -> Result<ImprovementStrategy> {
        Ok(ImprovementStrategy {
            focus_area: self.focus_area,
            rationale: self.rationale.clone(),
        })
    }

    fn apply(
        &self,
        _strategy: &ImprovementStrategy,
        outputs: &[NormalisedOutput],
        _results: &[JudgementResult],
    ) -> Vec<NormalisedOutput> {
        outputs.to_vec()
    }
}
