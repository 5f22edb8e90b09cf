//! ACL Flywheel Controller (C8) — the stateful iteration loop that
//! stratifies failures, picks a curriculum via the bandit scheduler, judges,
//! persists, and decides when to stop. Generalises the teacher's
//! `FallbackLoop`/`ExecutionLimits` shape in `orchestrator.rs` to an
//! evaluate-then-improve cycle instead of an execute-then-fallback one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::Result;
use crate::judge::{EvaluationSummary, JudgeEngine};
use crate::normaliser::NormalisedOutput;
use crate::patterns::PatternLearner;
use crate::persistence::PersistenceLayer;
use crate::scenario::EvaluationScenario;
use tracing::{info, instrument, warn};

use super::scheduler;
use super::strategy::{ImprovementStrategy, StrategyProvider};
use super::types::{CurriculumState, FlywheelReport, IterationRecord, StrategyRecord, TerminationReason};

/// Outcome of a single loop body: either keep iterating, or stop with a
/// clean termination reason. Fatal errors are surfaced as `Err` instead and
/// handled by the caller.
enum IterationOutcome {
    Continue,
    Stop(TerminationReason, EvaluationSummary),
}

pub struct FlywheelController {
    judge_engine: Arc<JudgeEngine>,
    pattern_learner: Arc<PatternLearner>,
    persistence: Arc<PersistenceLayer>,
    config: Config,
    cancelled: Arc<AtomicBool>,
}

impl FlywheelController {
    pub fn new(
        judge_engine: Arc<JudgeEngine>,
        pattern_learner: Arc<PatternLearner>,
        persistence: Arc<PersistenceLayer>,
        config: Config,
    ) -> Self {
        Self {
            judge_engine,
            pattern_learner,
            persistence,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A shared handle the caller can flip from another task to request
    /// cancellation between iterations, matching the teacher's
    /// `Arc<AtomicBool>` contexts rather than a `tokio_util::CancellationToken`.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Run the curriculum loop to completion: target reached, iteration or
    /// budget ceiling hit, plateau detected, cancellation observed, or a
    /// fatal error between iterations. Resumes from the most recent
    /// checkpoint in the persistence layer's run directory, if one exists.
    #[instrument(skip(self, baseline_outputs, scenarios, strategy_provider), fields(domain, target_pass_rate, max_iterations))]
    pub async fn run(
        &self,
        baseline_outputs: Vec<NormalisedOutput>,
        scenarios: &[EvaluationScenario],
        domain: &str,
        target_pass_rate: f64,
        max_iterations: u32,
        budget_usd: f64,
        strategy_provider: Arc<dyn StrategyProvider>,
    ) -> Result<FlywheelReport> {
        let started = Instant::now();
        let mut state = self
            .persistence
            .load_latest_checkpoint()
            .await?
            .unwrap_or_else(|| CurriculumState::new(domain));
        if state.iteration > 0 {
            info!(resumed_at_iteration = state.iteration, "resuming flywheel from checkpoint");
        }
        // C7 state (patterns) survives a restart the same way curriculum
        // state does: rehydrate from the keyed store before the first
        // iteration runs (§4.8 "Crash recovery").
        self.pattern_learner
            .hydrate_from_store(self.persistence.pattern_store().as_ref())?;
        let mut outputs = baseline_outputs;
        let mut history = Vec::new();

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                info!(iteration = state.iteration, "flywheel cancelled");
                return self
                    .finish(state, history, TerminationReason::Cancelled, 0.0)
                    .await;
            }
            if state.iteration >= max_iterations {
                info!(iteration = state.iteration, "flywheel hit max iterations");
                return self
                    .finish(state, history, TerminationReason::MaxIterations, 0.0)
                    .await;
            }
            if state.cumulative_cost_usd >= budget_usd {
                warn!(cumulative_cost_usd = state.cumulative_cost_usd, budget_usd, "flywheel hit budget ceiling");
                return self
                    .finish(state, history, TerminationReason::BudgetExceeded, 0.0)
                    .await;
            }

            let iteration_result = self
                .run_iteration(
                    &mut state,
                    &mut outputs,
                    scenarios,
                    target_pass_rate,
                    started,
                    strategy_provider.as_ref(),
                    &mut history,
                )
                .await;

            match iteration_result {
                Ok(IterationOutcome::Continue) => continue,
                Ok(IterationOutcome::Stop(reason, summary)) => {
                    return self.finish(state, history, reason, summary.pass_rate).await;
                }
                Err(err) => {
                    // Per §7's propagation policy: a fatal error between
                    // iterations is a stop condition, not an unwind — the
                    // final checkpoint is still persisted and a report
                    // still returned, just flagged incomplete.
                    warn!(iteration = state.iteration, error = %err, "fatal error mid-flywheel, persisting final checkpoint");
                    let _ = crate::persistence::checkpoint::write(self.persistence.run_dir(), &state).await;
                    let report = FlywheelReport {
                        domain: state.domain.clone(),
                        iterations_run: state.iteration,
                        final_pass_rate: state.overall_pass_rate_history.latest().unwrap_or(0.0),
                        termination_reason: TerminationReason::FatalError,
                        history,
                        total_cost_usd: state.cumulative_cost_usd,
                        mastered_categories: state.mastered.iter().cloned().collect(),
                        incomplete: true,
                        error: Some(err.to_string()),
                    };
                    let _ = self.persistence.write_final_report(&report).await;
                    return Ok(report);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(iteration = state.iteration))]
    async fn run_iteration(
        &self,
        state: &mut CurriculumState,
        outputs: &mut Vec<NormalisedOutput>,
        scenarios: &[EvaluationScenario],
        target_pass_rate: f64,
        started: Instant,
        strategy_provider: &dyn StrategyProvider,
        history: &mut Vec<IterationRecord>,
    ) -> Result<IterationOutcome> {
        let batch_size = scenarios.len().max(1);
        let mut curriculum = scheduler::pick_curriculum(
            state,
            scenarios,
            &self.pattern_learner,
            self.config.exploration_epsilon,
            self.config.pattern_overlap_threshold,
            batch_size,
        );
        if curriculum.is_empty() {
            // Every category mastered but the overall target wasn't hit
            // (e.g. a category outside the scenario set is dragging it
            // down) — fall back to the full bundle rather than stalling.
            curriculum = scenarios.to_vec();
        }

        info!(iteration = state.iteration, categories = curriculum.len(), "picked curriculum");
        let summary = self.judge_engine.evaluate(&curriculum, outputs, None).await?;

        for result in &summary.results {
            self.persistence.append_judgement(result).await?;
        }
        let pattern_store = self.persistence.pattern_store();
        self.pattern_learner
            .observe(&summary.results, &curriculum, outputs, Some(pattern_store.as_ref()))?;

        state.cumulative_cost_usd += summary.total_cost_usd;
        state.wall_clock_elapsed_secs = started.elapsed().as_secs_f64();

        let previous_overall = state.overall_pass_rate_history.latest();
        scheduler::update_state(
            state,
            &summary.per_category_pass_rate,
            summary.pass_rate,
            0.3,
            self.config.mastery_threshold,
        );

        self.persistence.write_checkpoint(state).await?;

        let categories_evaluated: Vec<String> = curriculum
            .iter()
            .map(|s| s.category.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        history.push(IterationRecord {
            iteration: state.iteration,
            pass_rate: summary.pass_rate,
            categories_evaluated,
            cost_usd: summary.total_cost_usd,
            strategy: state.last_strategy.clone(),
        });

        if summary.pass_rate >= target_pass_rate {
            info!(pass_rate = summary.pass_rate, target_pass_rate, "target reached");
            return Ok(IterationOutcome::Stop(TerminationReason::TargetReached, summary));
        }

        let plateaued = previous_overall
            .map(|prev| (summary.pass_rate - prev).abs() < self.config.plateau_delta)
            .unwrap_or(false);
        state.plateau_streak = if plateaued { state.plateau_streak + 1 } else { 0 };
        if state.plateau_streak >= 2 {
            warn!(pass_rate = summary.pass_rate, "pass rate plateaued, stopping");
            return Ok(IterationOutcome::Stop(TerminationReason::Plateau, summary));
        }

        let strategy: ImprovementStrategy = strategy_provider.choose(state, &summary).await?;
        *outputs = strategy_provider.apply(&strategy, outputs, &summary.results);
        state.last_strategy = Some(StrategyRecord {
            focus_area: strategy.focus_area,
            rationale: strategy.rationale,
        });

        Ok(IterationOutcome::Continue)
    }

    async fn finish(
        &self,
        state: CurriculumState,
        history: Vec<IterationRecord>,
        reason: TerminationReason,
        last_pass_rate: f64,
    ) -> Result<FlywheelReport> {
        let final_pass_rate = if last_pass_rate > 0.0 {
            last_pass_rate
        } else {
            state.overall_pass_rate_history.latest().unwrap_or(0.0)
        };
        let report = FlywheelReport {
            domain: state.domain.clone(),
            iterations_run: state.iteration,
            final_pass_rate,
            termination_reason: reason,
            history,
            total_cost_usd: state.cumulative_cost_usd,
            mastered_categories: state.mastered.iter().cloned().collect(),
            incomplete: false,
            error: None,
        };
        self.persistence.write_final_report(&report).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flywheel::types::FocusArea;
    use crate::judge::{JudgementResult, Track};
    use crate::normaliser::FrameworkTag;
    use crate::provider::{
        BatchHandle, BatchStatus, ChatRole, CompletionRequest, CompletionResponse, LLMClient,
        ModelSpec, Provider, TokenUsage,
    };
    use crate::scenario::{Severity, TestType};
    use async_trait::async_trait;
    use chrono::Utc;

    fn scenario(id: &str, category: &str) -> EvaluationScenario {
        EvaluationScenario {
            id: id.to_string(),
            name: id.to_string(),
            severity: Severity::High,
            category: category.to_string(),
            test_type: TestType::Negative,
            expected_behaviour: "refuse".to_string(),
            failure_indicators: vec![],
            remediation: String::new(),
            compliance_frameworks: vec![],
            pass_threshold: None,
            extra: Default::default(),
        }
    }

    /// Always answers with a passing judgement; used to exercise the
    /// target-reached termination path deterministically.
    struct AlwaysPassClient;

    #[async_trait]
    impl LLMClient for AlwaysPassClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            assert_eq!(request.messages[0].role, ChatRole::User);
            Ok(CompletionResponse {
                id: "r".into(),
                model: "mock".into(),
                content: r#"{"passed": true, "score": 0.95, "feedback": "ok", "evidence": []}"#.into(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    cache_read_tokens: None,
                },
                timestamp: Utc::now(),
                cost: Some(0.001),
                logprobs: None,
                downgraded: false,
            })
        }

        async fn poll(&self, _handle: &BatchHandle) -> Result<BatchStatus> {
            Ok(BatchStatus::Completed(vec![]))
        }

        fn estimate_cost(&self, _model: &str, _input_tokens: u64, _output_tokens: u64) -> f64 {
            0.001
        }

        fn available_models(&self) -> Vec<ModelSpec> {
            vec![ModelSpec::claude_sonnet()]
        }

        fn provider(&self) -> Provider {
            Provider::Anthropic
        }
    }

    struct NoopStrategyProvider;

    #[async_trait]
    impl StrategyProvider for NoopStrategyProvider {
        async fn choose(
            &self,
            _state: &crate::flywheel::strategy::CurriculumSnapshot,
            _summary: &crate::flywheel::strategy::Summary,
        ) -> Result<ImprovementStrategy> {
            Ok(ImprovementStrategy {
                focus_area: FocusArea::General,
                rationale: "no-op".into(),
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

    #[tokio::test]
    async fn stops_at_target_reached_on_the_first_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(PersistenceLayer::open(dir.path()).await.unwrap());
        let config = Config::default();
        let engine = Arc::new(JudgeEngine::new(Arc::new(AlwaysPassClient), config.clone()));
        let learner = Arc::new(PatternLearner::new(config.pattern_overlap_threshold));
        let controller = FlywheelController::new(engine, learner, persistence, config);

        let scenarios = vec![scenario("fin_001", "pii")];
        let outputs = vec![NormalisedOutput::new("o1", "we refuse that request", FrameworkTag::Generic).unwrap()];

        let report = controller
            .run(
                outputs,
                &scenarios,
                "finance",
                0.9,
                10,
                100.0,
                Arc::new(NoopStrategyProvider),
            )
            .await
            .unwrap();

        assert_eq!(report.termination_reason, TerminationReason::TargetReached);
        assert!(!report.incomplete);
        assert_eq!(report.iterations_run, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_before_further_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(PersistenceLayer::open(dir.path()).await.unwrap());
        let config = Config::default();
        let engine = Arc::new(JudgeEngine::new(Arc::new(AlwaysPassClient), config.clone()));
        let learner = Arc::new(PatternLearner::new(config.pattern_overlap_threshold));
        let controller = FlywheelController::new(engine, learner, persistence, config);
        controller.cancel_handle().store(true, Ordering::SeqCst);

        let scenarios = vec![scenario("fin_001", "pii")];
        let outputs = vec![NormalisedOutput::new("o1", "we refuse that request", FrameworkTag::Generic).unwrap()];

        let report = controller
            .run(
                outputs,
                &scenarios,
                "finance",
                0.99,
                10,
                100.0,
                Arc::new(NoopStrategyProvider),
            )
            .await
            .unwrap();

        assert_eq!(report.termination_reason, TerminationReason::Cancelled);
        assert_eq!(report.iterations_run, 0);
    }

    /// Deterministically returns `passed=true` for the first `N` scenarios
    /// of each 50-scenario iteration and `passed=false` for the rest, where
    /// `N` grows by one call-batch at a time. Exercises §8 scenario 4: a
    /// contrived monotone improver that gains 0.1 pass rate per iteration.
    struct MonotoneImproverClient {
        scenario_count: usize,
        call_counter: std::sync::atomic::AtomicU64,
    }

    impl MonotoneImproverClient {
        fn new(scenario_count: usize) -> Self {
            Self {
                scenario_count,
                call_counter: std::sync::atomic::AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl LLMClient for MonotoneImproverClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
            let call_index = self.call_counter.fetch_add(1, Ordering::SeqCst) as usize;
            let iteration_number = call_index / self.scenario_count + 1;
            // Baseline pass rate of 0.42 before any iteration, +0.1 per
            // completed iteration (§8 scenario 4: "starting from 0.42").
            let rate = 0.42 + 0.1 * iteration_number as f64;
            let pass_count = (rate * self.scenario_count as f64).round() as usize;
            let position = call_index % self.scenario_count;
            let passed = position < pass_count;
            let score = if passed { 1.0 } else { 0.0 };
            // Decisive logprobs so the engine takes the logprob-calibration
            // path instead of spending a second call per scenario on the
            // self-consistency fallback, which would double the call count
            // this test's iteration-boundary math depends on.
            let mut by_token = std::collections::HashMap::new();
            if passed {
                by_token.insert("PASS".to_string(), -0.01);
                by_token.insert("FAIL".to_string(), -8.0);
            } else {
                by_token.insert("PASS".to_string(), -8.0);
                by_token.insert("FAIL".to_string(), -0.01);
            }
            Ok(CompletionResponse {
                id: "r".into(),
                model: "mock".into(),
                content: format!(
                    r#"{{"passed": {passed}, "score": {score}, "feedback": "ok", "evidence": []}}"#
                ),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    cache_read_tokens: None,
                },
                timestamp: Utc::now(),
                cost: Some(0.001),
                logprobs: Some(crate::provider::TokenLogprobs { by_token }),
                downgraded: false,
            })
        }

        async fn poll(&self, _handle: &BatchHandle) -> Result<BatchStatus> {
            Ok(BatchStatus::Completed(vec![]))
        }

        fn estimate_cost(&self, _model: &str, _input_tokens: u64, _output_tokens: u64) -> f64 {
            0.001
        }

        fn available_models(&self) -> Vec<ModelSpec> {
            vec![ModelSpec::claude_sonnet()]
        }

        fn provider(&self) -> Provider {
            Provider::Anthropic
        }
    }

    #[tokio::test]
    async fn flywheel_converges_in_exactly_five_iterations_with_a_monotone_improver() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(PersistenceLayer::open(dir.path()).await.unwrap());
        let mut config = Config::default();
        // Five iterations of 50 fast-track calls each share one rate limiter;
        // raise its bucket so the test exercises convergence, not throttling.
        config.provider_rate_limit_per_window = 1000;
        let scenario_count = 50;
        let engine = Arc::new(JudgeEngine::new(
            Arc::new(MonotoneImproverClient::new(scenario_count)),
            config.clone(),
        ));
        let learner = Arc::new(PatternLearner::new(config.pattern_overlap_threshold));
        let controller = FlywheelController::new(engine, learner, persistence, config);

        // All scenarios share one category so the bandit scheduler always
        // selects the whole set together (see scheduler.rs: sampling picks
        // whole categories, not individual scenarios within one).
        let scenarios: Vec<_> = (0..scenario_count)
            .map(|i| scenario(&format!("fin_{i:03}"), "general"))
            .collect();
        let outputs = vec![NormalisedOutput::new("o1", "the agent responded", FrameworkTag::Generic).unwrap()];

        let report = controller
            .run(
                outputs,
                &scenarios,
                "finance",
                0.91,
                30,
                1000.0,
                Arc::new(NoopStrategyProvider),
            )
            .await
            .unwrap();

        assert_eq!(report.termination_reason, TerminationReason::TargetReached);
        assert_eq!(report.iterations_run, 5);
        assert!(!report.incomplete);

        let pass_rates: Vec<f64> = report.history.iter().map(|r| r.pass_rate).collect();
        assert_eq!(pass_rates.len(), 5);
        for window in pass_rates.windows(2) {
            assert!(window[1] > window[0], "pass rate history must strictly increase: {pass_rates:?}");
        }
    }

    /// Always returns the same fixed pass rate, regardless of iteration —
    /// exercises §8 scenario 5 (plateau detection after two flat
    /// iterations in a row).
    struct FixedRateClient {
        scenario_count: usize,
        pass_count: usize,
        call_counter: std::sync::atomic::AtomicU64,
    }

    impl FixedRateClient {
        fn new(scenario_count: usize, pass_count: usize) -> Self {
            Self {
                scenario_count,
                pass_count,
                call_counter: std::sync::atomic::AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl LLMClient for FixedRateClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
            let call_index = self.call_counter.fetch_add(1, Ordering::SeqCst) as usize;
            let position = call_index % self.scenario_count;
            let passed = position < self.pass_count;
            let score = if passed { 1.0 } else { 0.0 };
            let mut by_token = std::collections::HashMap::new();
            if passed {
                by_token.insert("PASS".to_string(), -0.01);
                by_token.insert("FAIL".to_string(), -8.0);
            } else {
                by_token.insert("PASS".to_string(), -8.0);
                by_token.insert("FAIL".to_string(), -0.01);
            }
            Ok(CompletionResponse {
                id: "r".into(),
                model: "mock".into(),
                content: format!(
                    r#"{{"passed": {passed}, "score": {score}, "feedback": "ok", "evidence": []}}"#
                ),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    cache_read_tokens: None,
                },
                timestamp: Utc::now(),
                cost: Some(0.001),
                logprobs: Some(crate::provider::TokenLogprobs { by_token }),
                downgraded: false,
            })
        }

        async fn poll(&self, _handle: &BatchHandle) -> Result<BatchStatus> {
            Ok(BatchStatus::Completed(vec![]))
        }

        fn estimate_cost(&self, _model: &str, _input_tokens: u64, _output_tokens: u64) -> f64 {
            0.001
        }

        fn available_models(&self) -> Vec<ModelSpec> {
            vec![ModelSpec::claude_sonnet()]
        }

        fn provider(&self) -> Provider {
            Provider::Anthropic
        }
    }

    #[tokio::test]
    async fn plateau_detection_stops_after_two_flat_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(PersistenceLayer::open(dir.path()).await.unwrap());
        let mut config = Config::default();
        // Up to 30 iterations of 20 fast-track calls each share one rate
        // limiter; raise its bucket so the test exercises plateau detection,
        // not throttling.
        config.provider_rate_limit_per_window = 1000;
        let scenario_count = 20;
        let engine = Arc::new(JudgeEngine::new(
            Arc::new(FixedRateClient::new(scenario_count, scenario_count / 2)),
            config.clone(),
        ));
        let learner = Arc::new(PatternLearner::new(config.pattern_overlap_threshold));
        let controller = FlywheelController::new(engine, learner, persistence, config);

        let scenarios: Vec<_> = (0..scenario_count)
            .map(|i| scenario(&format!("fin_{i:03}"), "general"))
            .collect();
        let outputs = vec![NormalisedOutput::new("o1", "the agent responded", FrameworkTag::Generic).unwrap()];

        let report = controller
            .run(
                outputs,
                &scenarios,
                "finance",
                0.91,
                30,
                1000.0,
                Arc::new(NoopStrategyProvider),
            )
            .await
            .unwrap();

        assert_eq!(report.termination_reason, TerminationReason::Plateau);
        assert!(!report.incomplete);
        assert!(report.iterations_run >= 2);
    }
}
