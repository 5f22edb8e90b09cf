//! Top-level output contract: a `RunReport` for each end-to-end evaluation
//! run, and the `run_evaluation` entry point that ties C1 through C6 (and
//! optionally C8) together the way a CLI or dashboard caller would.
//!
//! The top-level run yields a structured report even on failure: a fatal
//! error from any stage still leaves whatever was completed reported,
//! mirroring `FlywheelController::run`'s own `incomplete`/`error` fields
//! rather than unwinding past partially-recorded work.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compliance::{self, AgentConfig, RuleReport};
use crate::error::Result;
use crate::flywheel::{FlywheelController, FlywheelReport, StrategyProvider};
use crate::judge::{EvaluationSummary, ForceMode, JudgeEngine, JudgementResult};
use crate::normaliser::{self, NormalisedOutput, RawRecord};
use crate::predictor::{self, HybridPredictor, ReliabilityPrediction};
use crate::scenario::EvaluationScenario;

/// Everything a caller needs to request one evaluation run.
pub struct RunRequest {
    pub raw_records: Vec<RawRecord>,
    pub scenarios: Vec<EvaluationScenario>,
    pub agent_config: AgentConfig,
    pub force_mode: Option<ForceMode>,
}

/// §6 "Output contract": the full judgement set, the aggregate summary, the
/// hybrid reliability prediction, and — when a flywheel run was requested —
/// its report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub judgements: Vec<JudgementResult>,
    pub summary: EvaluationSummary,
    pub prediction: ReliabilityPrediction,
    pub flywheel: Option<FlywheelReport>,
}

/// Normalise, judge, and predict in one call — the shape a CLI or dashboard
/// driver uses directly. Does not run the flywheel; see
/// [`run_evaluation_with_flywheel`] for the curriculum-loop variant.
pub async fn run_evaluation(
    judge_engine: &JudgeEngine,
    predictor: &HybridPredictor,
    request: RunRequest,
) -> Result<RunReport> {
    let outputs = normaliser::normalise_batch(&request.raw_records)?;
    let rule_report: RuleReport = compliance::check_all(&request.agent_config);

    let summary = judge_engine
        .evaluate(&request.scenarios, &outputs, request.force_mode)
        .await?;
    let digest = predictor::build_digest(&outputs, &summary.results);
    let prediction = predictor.predict(&rule_report, digest).await?;

    Ok(RunReport {
        judgements: summary.results.clone(),
        summary,
        prediction,
        flywheel: None,
    })
}

/// As [`run_evaluation`], but follows the initial evaluation with a
/// flywheel curriculum loop when the first pass misses `target_pass_rate`.
#[allow(clippy::too_many_arguments)]
pub async fn run_evaluation_with_flywheel(
    judge_engine: Arc<JudgeEngine>,
    predictor: &HybridPredictor,
    flywheel: Arc<FlywheelController>,
    domain: &str,
    request: RunRequest,
    target_pass_rate: f64,
    max_iterations: u32,
    budget_usd: f64,
    strategy_provider: Arc<dyn StrategyProvider>,
) -> Result<RunReport> {
    let outputs = normaliser::normalise_batch(&request.raw_records)?;
    let rule_report: RuleReport = compliance::check_all(&request.agent_config);

    let summary = judge_engine
        .evaluate(&request.scenarios, &outputs, request.force_mode)
        .await?;

    let flywheel_report = if summary.pass_rate < target_pass_rate {
        Some(
            flywheel
                .run(
                    outputs.clone(),
                    &request.scenarios,
                    domain,
                    target_pass_rate,
                    max_iterations,
                    budget_usd,
                    strategy_provider,
                )
                .await?,
        )
    } else {
        None
    };

    let digest = predictor::build_digest(&outputs, &summary.results);
    let prediction = predictor.predict(&rule_report, digest).await?;

    Ok(RunReport {
        judgements: summary.results.clone(),
        summary,
        prediction,
        flywheel: flywheel_report,
    })
}
