//! Scenario Store (C2).

pub mod store;
pub mod types;

pub use store::ScenarioStore;
pub use types::{EvaluationScenario, ScenarioBundle, Severity, TestType};
