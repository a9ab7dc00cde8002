//! Scenario runtime state

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-session progression through a scenario.
///
/// Round-tripped to the persistent store as a JSON blob after every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScenarioState {
    pub current_step: String,
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

impl ScenarioState {
    pub fn to_blob(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_blob(blob: &str) -> Option<Self> {
        serde_json::from_str(blob).ok()
    }
}

/// Parsed `[SCENARIO_UPDATE: {...}]` directive.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct ScenarioUpdate {
    #[serde(default)]
    pub next_step: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ScenarioUpdate {
    pub fn is_empty(&self) -> bool {
        self.next_step.is_none() && self.variables.is_empty()
    }
}

/// What applying an update did.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Current step moved; the old step joined `completed_steps`.
    Advanced { from: String, to: String },
    /// No step movement (no target, or replay of the current step).
    VariablesOnly,
    /// Target step unknown or transition not permitted; step state untouched.
    Rejected { next_step: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_blob_round_trip() {
        let mut state = ScenarioState {
            current_step: "intro".to_string(),
            completed_steps: vec![],
            variables: HashMap::new(),
        };
        state
            .variables
            .insert("name".to_string(), Value::String("Jean".to_string()));

        let blob = state.to_blob();
        assert_eq!(ScenarioState::from_blob(&blob), Some(state));
    }

    #[test]
    fn test_update_deserializes_partial_payloads() {
        let update: ScenarioUpdate = serde_json::from_str(r#"{"next_step":"a"}"#).unwrap();
        assert_eq!(update.next_step.as_deref(), Some("a"));
        assert!(update.variables.is_empty());

        let update: ScenarioUpdate = serde_json::from_str(r#"{}"#).unwrap();
        assert!(update.is_empty());
    }
}
