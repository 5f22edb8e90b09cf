//! ACL Flywheel Controller (C8): a stateful iteration loop that stratifies
//! failures, picks a curriculum bucket via a bandit-style scheduler, judges
//! it, applies a targeted improvement strategy, and decides when to stop.
//! Generalises the teacher's `FallbackLoop`/`ExecutionLimits`/
//! `OrchestrationRoutingRuntime` shapes in `orchestrator.rs`.

pub mod controller;
pub mod scheduler;
pub mod strategy;
pub mod types;

pub use controller::FlywheelController;
pub use strategy::{CurriculumSnapshot, ImprovementStrategy, ScriptedStrategyProvider, StrategyProvider, Summary};
pub use types::{
    CurriculumState, FlywheelReport, FocusArea, IterationRecord, PassRateHistory, StrategyRecord,
    TerminationReason,
};
