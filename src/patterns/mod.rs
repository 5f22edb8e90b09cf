//! Pattern Learner & Scenario Bank (C7): clusters judgement failures into
//! patterns and proposes sampling-weight boosts for the next curriculum
//! iteration. A one-way observer — it never calls back into its consumers.

pub mod learner;
pub mod types;

pub use learner::{PatternLearner, PATTERN_FREQUENCY_THRESHOLD};
pub use types::Pattern;
