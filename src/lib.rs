//! # reliab-core
//!
//! An agent reliability evaluation platform: a dual-track LLM judge engine,
//! a hybrid (rule + LLM) reliability predictor, and an adaptive curriculum
//! flywheel that drives a failing agent configuration toward a target pass
//! rate.
//!
//! ## Core components
//!
//! - **Normaliser** (C1): canonicalises heterogeneous agent output.
//! - **Scenario store** (C2): loads and caches versioned compliance scenarios.
//! - **Provider adapter** (C3): unified, cost-tracked, rate-limited LLM access.
//! - **Compliance rule engine** (C4): deterministic config-based scoring.
//! - **Judge engine** (C5): dual-track (fast/batch) scenario evaluation.
//! - **Reliability predictor** (C6): fuses C4's score with an LLM risk estimate.
//! - **Pattern learner** (C7): clusters recurring failures into patterns.
//! - **Flywheel controller** (C8): an adaptive curriculum improvement loop.
//! - **Persistence** (C9): append-only event log, checkpoints, pattern store.
//!
//! ## Example
//!
//! ```rust,ignore
//! use reliab_core::{run_evaluation, RunRequest, JudgeEngine, HybridPredictor, Config};
//!
//! let report = run_evaluation(&judge_engine, &predictor, request).await?;
//! println!("pass rate: {}", report.summary.pass_rate);
//! ```

pub mod compliance;
pub mod config;
pub mod error;
pub mod flywheel;
pub mod judge;
pub mod normaliser;
pub mod patterns;
pub mod persistence;
pub mod predictor;
pub mod provider;
pub mod report;
pub mod scenario;

pub use compliance::{AgentConfig, CheckOutcome, RuleReport, Violation, ViolationKind};
pub use config::Config;
pub use error::{Error, ProviderErrorKind, Result};
pub use flywheel::{
    CurriculumSnapshot, CurriculumState, FlywheelController, FlywheelReport, FocusArea,
    ImprovementStrategy, IterationRecord, PassRateHistory, ScriptedStrategyProvider,
    StrategyProvider, StrategyRecord, Summary, TerminationReason,
};
pub use judge::{
    BiasDiagnostics, EvaluationSummary, ForceMode, JudgeEngine, JudgementResult, ParsedJudgement,
    ScenarioState, Track,
};
pub use normaliser::{FrameworkTag, NormalisedOutput, PerformanceMetrics, RawRecord, TraceStep, TraceStepKind};
pub use patterns::{Pattern, PatternLearner};
pub use persistence::{Event, EventLog, PatternStore, PersistenceLayer};
pub use predictor::{
    AnalysisDigest, BusinessImpact, HybridPredictor, LlmComponent, ReliabilityPrediction,
    RiskLevel, RuleComponent,
};
pub use provider::{
    AnthropicClient, BatchHandle, BatchJob, BatchResult, BatchStatus, ChatMessage, ChatRole,
    ClientConfig, CompletionRequest, CompletionResponse, CostTracker, LLMClient, LogprobsRequest,
    ModelRouter, ModelSpec, ModelTier, OpenAiClient, Provider, ProviderRateLimiter, RetryConfig,
    TokenLogprobs, TokenUsage,
};
pub use report::{run_evaluation, run_evaluation_with_flywheel, RunReport, RunRequest};
pub use scenario::{EvaluationScenario, ScenarioBundle, ScenarioStore, Severity, TestType};
