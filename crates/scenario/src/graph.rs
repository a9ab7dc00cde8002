//! Scenario graph definition and validation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::state::{ScenarioState, ScenarioUpdate, UpdateOutcome};
use crate::ScenarioError;

/// One step of a coaching exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Prompt template; `{variable}` placeholders are substituted from the
    /// session's variable map.
    pub prompt_template: String,
    /// Variables this step tries to extract from the participant
    #[serde(default)]
    pub expected_variables: Vec<String>,
    /// Step ids the exercise may move to from here
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Terminal steps end the exercise
    #[serde(default)]
    pub terminal: bool,
}

/// A validated exercise graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    pub initial_step: String,
    pub steps: Vec<ScenarioStep>,
}

/// Generation context derived from a scenario and its runtime state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioContext {
    pub scenario_name: String,
    pub goal: Option<String>,
    pub step_name: String,
    pub step_description: String,
    pub rendered_prompt: String,
    pub expected_variables: Vec<String>,
    pub possible_next_steps: Vec<String>,
    pub is_complete: bool,
    pub variables: HashMap<String, Value>,
}

impl Scenario {
    /// Parse and validate a YAML scenario file.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario =
            serde_yaml::from_str(yaml).map_err(|e| ScenarioError::Parse(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse and validate a JSON scenario blob.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario =
            serde_json::from_str(json).map_err(|e| ScenarioError::Parse(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Validate graph invariants once, at load time.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |reason: String| ScenarioError::Invalid {
            scenario: self.id.clone(),
            reason,
        };

        if self.steps.is_empty() {
            return Err(invalid("scenario has no steps".to_string()));
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(invalid(format!("duplicate step id '{}'", step.id)));
            }
        }

        if !ids.contains(self.initial_step.as_str()) {
            return Err(invalid(format!(
                "initial step '{}' does not exist",
                self.initial_step
            )));
        }

        for step in &self.steps {
            for next in &step.next_steps {
                if !ids.contains(next.as_str()) {
                    return Err(invalid(format!(
                        "step '{}' references unknown next step '{}'",
                        step.id, next
                    )));
                }
            }
        }

        Ok(())
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&ScenarioStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Fresh runtime state positioned at the initial step.
    pub fn initial_state(&self) -> ScenarioState {
        ScenarioState {
            current_step: self.initial_step.clone(),
            completed_steps: Vec::new(),
            variables: HashMap::new(),
        }
    }

    /// Apply a scenario-update directive to runtime state.
    ///
    /// A `next_step` is honored when it exists in the graph and is either
    /// listed in the current step's permitted next steps or the current
    /// step is non-terminal. Unknown or impermissible targets are rejected
    /// and logged, leaving `current_step`/`completed_steps` untouched.
    /// Re-applying the same move is a no-op, so a replayed update never
    /// pushes the old step into `completed_steps` twice. Variables merge
    /// last-write-wins in every case.
    pub fn apply_update(&self, state: &mut ScenarioState, update: &ScenarioUpdate) -> UpdateOutcome {
        let outcome = match update.next_step.as_deref() {
            None => UpdateOutcome::VariablesOnly,
            Some(next) if next == state.current_step => UpdateOutcome::VariablesOnly,
            Some(next) => match (self.step(&state.current_step), self.step(next)) {
                (_, None) => {
                    tracing::warn!(
                        scenario = %self.id,
                        current = %state.current_step,
                        next_step = %next,
                        "rejecting scenario update: unknown next step"
                    );
                    UpdateOutcome::Rejected {
                        next_step: next.to_string(),
                    }
                }
                (Some(current), Some(_))
                    if current.next_steps.iter().any(|s| s == next) || !current.terminal =>
                {
                    let from = state.current_step.clone();
                    state.completed_steps.push(from.clone());
                    state.current_step = next.to_string();
                    UpdateOutcome::Advanced {
                        from,
                        to: next.to_string(),
                    }
                }
                _ => {
                    tracing::warn!(
                        scenario = %self.id,
                        current = %state.current_step,
                        next_step = %next,
                        "rejecting scenario update: transition not permitted"
                    );
                    UpdateOutcome::Rejected {
                        next_step: next.to_string(),
                    }
                }
            },
        };

        for (key, value) in &update.variables {
            state.variables.insert(key.clone(), value.clone());
        }

        outcome
    }

    /// Context for the generation prompt, or `None` if the state points at
    /// a step that no longer exists (stale persisted state).
    pub fn context(&self, state: &ScenarioState) -> Option<ScenarioContext> {
        let step = self.step(&state.current_step)?;
        Some(ScenarioContext {
            scenario_name: self.name.clone(),
            goal: self.goal.clone(),
            step_name: step.name.clone(),
            step_description: step.description.clone(),
            rendered_prompt: render_template(&step.prompt_template, &state.variables),
            expected_variables: step.expected_variables.clone(),
            possible_next_steps: step.next_steps.clone(),
            is_complete: step.terminal,
            variables: state.variables.clone(),
        })
    }
}

/// Substitute `{name}` placeholders; unknown placeholders stay literal.
fn render_template(template: &str, variables: &HashMap<String, Value>) -> String {
    let mut out = template.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{}}}", key);
        if out.contains(&placeholder) {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&placeholder, &rendered);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interview_scenario() -> Scenario {
        Scenario::from_yaml(
            r#"
id: entretien
name: Simulation d'entretien
goal: Pratiquer un entretien d'embauche
initial_step: intro
steps:
  - id: intro
    name: Introduction
    description: Se presenter
    prompt_template: "Demande au candidat de se presenter."
    expected_variables: [name]
    next_steps: [experience]
  - id: experience
    name: Experience
    prompt_template: "Interroge {name} sur son experience."
    expected_variables: [years]
    next_steps: [conclusion]
  - id: conclusion
    name: Conclusion
    prompt_template: "Conclus l'entretien avec {name}."
    terminal: true
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validation_rejects_unknown_references() {
        let err = Scenario::from_yaml(
            r#"
id: broken
name: Broken
initial_step: a
steps:
  - id: a
    name: A
    prompt_template: "x"
    next_steps: [missing]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_initial_step() {
        let err = Scenario::from_yaml(
            r#"
id: broken
name: Broken
initial_step: nope
steps:
  - id: a
    name: A
    prompt_template: "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid { .. }));
    }

    #[test]
    fn test_permitted_advance_with_variables() {
        let scenario = interview_scenario();
        let mut state = scenario.initial_state();

        let update: ScenarioUpdate = serde_json::from_value(json!({
            "next_step": "experience",
            "variables": {"name": "Jean"}
        }))
        .unwrap();

        let outcome = scenario.apply_update(&mut state, &update);
        assert!(matches!(outcome, UpdateOutcome::Advanced { .. }));
        assert_eq!(state.completed_steps, vec!["intro".to_string()]);
        assert_eq!(state.current_step, "experience");
        assert_eq!(state.variables["name"], json!("Jean"));
    }

    #[test]
    fn test_unknown_next_step_rejected() {
        let scenario = interview_scenario();
        let mut state = scenario.initial_state();

        let update: ScenarioUpdate =
            serde_json::from_value(json!({"next_step": "inconnu"})).unwrap();
        let outcome = scenario.apply_update(&mut state, &update);

        assert!(matches!(outcome, UpdateOutcome::Rejected { .. }));
        assert_eq!(state.current_step, "intro");
        assert!(state.completed_steps.is_empty());
    }

    #[test]
    fn test_replay_completes_exactly_once() {
        let scenario = interview_scenario();
        let mut state = scenario.initial_state();

        let update: ScenarioUpdate =
            serde_json::from_value(json!({"next_step": "experience"})).unwrap();
        scenario.apply_update(&mut state, &update);
        scenario.apply_update(&mut state, &update);

        assert_eq!(state.completed_steps, vec!["intro".to_string()]);
        assert_eq!(state.current_step, "experience");
    }

    #[test]
    fn test_terminal_step_blocks_unlisted_transitions() {
        let scenario = interview_scenario();
        let mut state = scenario.initial_state();

        for next in ["experience", "conclusion"] {
            let update: ScenarioUpdate =
                serde_json::from_value(json!({ "next_step": next })).unwrap();
            scenario.apply_update(&mut state, &update);
        }
        assert_eq!(state.current_step, "conclusion");

        let back: ScenarioUpdate =
            serde_json::from_value(json!({"next_step": "intro"})).unwrap();
        let outcome = scenario.apply_update(&mut state, &back);
        assert!(matches!(outcome, UpdateOutcome::Rejected { .. }));
        assert_eq!(state.current_step, "conclusion");
    }

    #[test]
    fn test_variables_merge_last_write_wins() {
        let scenario = interview_scenario();
        let mut state = scenario.initial_state();

        let first: ScenarioUpdate =
            serde_json::from_value(json!({"variables": {"name": "Jean", "city": "Lyon"}}))
                .unwrap();
        let second: ScenarioUpdate =
            serde_json::from_value(json!({"variables": {"name": "Marie"}})).unwrap();

        scenario.apply_update(&mut state, &first);
        scenario.apply_update(&mut state, &second);

        assert_eq!(state.variables["name"], json!("Marie"));
        assert_eq!(state.variables["city"], json!("Lyon"));
    }

    #[test]
    fn test_context_renders_template() {
        let scenario = interview_scenario();
        let mut state = scenario.initial_state();

        let update: ScenarioUpdate = serde_json::from_value(json!({
            "next_step": "experience",
            "variables": {"name": "Jean"}
        }))
        .unwrap();
        scenario.apply_update(&mut state, &update);

        let context = scenario.context(&state).unwrap();
        assert_eq!(context.rendered_prompt, "Interroge Jean sur son experience.");
        assert_eq!(context.possible_next_steps, vec!["conclusion".to_string()]);
        assert!(!context.is_complete);
    }

    #[test]
    fn test_unknown_placeholder_left_literal() {
        let rendered = render_template("Salut {qui}", &HashMap::new());
        assert_eq!(rendered, "Salut {qui}");
    }
}
