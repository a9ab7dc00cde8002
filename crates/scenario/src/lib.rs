//! Exercise scenarios
//!
//! A scenario is a fixed directed graph of coaching-exercise steps with
//! named variables, loaded once per session and validated at load time.
//! Runtime progression lives in [`ScenarioState`] and is only ever mutated
//! through [`apply_update`](Scenario::apply_update).

mod graph;
mod state;

pub use graph::{Scenario, ScenarioContext, ScenarioStep};
pub use state::{ScenarioState, ScenarioUpdate, UpdateOutcome};

/// Scenario errors
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to parse scenario: {0}")]
    Parse(String),

    #[error("invalid scenario '{scenario}': {reason}")]
    Invalid { scenario: String, reason: String },
}
