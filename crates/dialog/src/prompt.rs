//! Generation prompt building
//!
//! Assembles the ordered message list for the generation backend: system
//! instruction (emotion protocol, optional scenario context and update
//! directive, optional resumption phrasing), then the bounded history
//! window.

use parlo_core::{ChatMessage, Emotion, Language};
use parlo_scenario::ScenarioContext;

use crate::continuity::{ContinuityEntry, ContinuityMemory, InterruptionKind};

/// Inputs for one turn's generation request.
pub struct PromptContext<'a> {
    pub language: Language,
    /// Session-level goal, independent of any scenario
    pub goal: Option<&'a str>,
    pub scenario: Option<&'a ScenarioContext>,
    /// Full participant history; only the last `history_window` entries are sent
    pub history: &'a [ChatMessage],
    pub history_window: usize,
    /// Advisory flag: the previous reply was interrupted
    pub interrupted: bool,
    /// Continuity entry to resume from, if this is the first reply after an
    /// interruption
    pub continuity: Option<(&'a ContinuityEntry, InterruptionKind)>,
    /// Agent-profile system prompt override
    pub agent_prompt: Option<&'a str>,
}

/// Build the message list for a normal turn.
pub fn build_turn_messages(ctx: &PromptContext<'_>) -> Vec<ChatMessage> {
    let mut system = String::new();

    match ctx.agent_prompt {
        Some(prompt) => system.push_str(prompt),
        None => system.push_str(
            "Tu es un coach de conversation bienveillant. Réponds de façon \
             brève et naturelle : tes réponses sont lues à voix haute.",
        ),
    }
    system.push_str(&format!("\nLangue de la conversation : {}.", ctx.language));

    if let Some(goal) = ctx.goal {
        system.push_str(&format!("\nObjectif de la session : {}.", goal));
    }

    system.push_str(&emotion_instruction());

    if let Some(scenario) = ctx.scenario {
        system.push_str(&scenario_instruction(scenario));
    }

    if ctx.interrupted {
        system.push_str(
            "\nLe participant vient de t'interrompre. Réponds d'abord à ce \
             qu'il vient de dire, sans répéter ta réponse précédente.",
        );
    } else if let Some((entry, kind)) = ctx.continuity {
        let phrase = ContinuityMemory::pick_phrase(entry, kind);
        system.push_str(&format!(
            "\nLa conversation a été interrompue précédemment (sujet : {}). \
             Reprends naturellement, par exemple : « {} »",
            entry.topic, phrase
        ));
    }

    let mut messages = vec![ChatMessage::system(system)];
    let window_start = ctx.history.len().saturating_sub(ctx.history_window);
    messages.extend_from_slice(&ctx.history[window_start..]);
    messages
}

/// Build the message list for a gentle prompt (short encouragement during
/// a pause). Never appended to the persisted history.
pub fn build_gentle_prompt_messages(
    language: Language,
    scenario: Option<&ScenarioContext>,
) -> Vec<ChatMessage> {
    let mut system = String::from(
        "Tu es un coach de conversation bienveillant. Le participant marque \
         une pause au milieu de sa phrase. Offre un très court encouragement \
         (quelques mots) pour l'inviter à continuer, sans changer de sujet.",
    );
    system.push_str(&format!("\nLangue : {}.", language));
    system.push_str(&emotion_instruction());
    if let Some(scenario) = scenario {
        system.push_str(&format!(
            "\nContexte de l'exercice : {} — étape « {} ».",
            scenario.scenario_name, scenario.step_name
        ));
    }

    vec![
        ChatMessage::system(system),
        ChatMessage::user("…".to_string()),
    ]
}

fn emotion_instruction() -> String {
    format!(
        "\nTermine chaque réponse par une ligne de la forme exacte \
         [EMOTION: <tag>] où <tag> est l'un de : {}.",
        Emotion::vocabulary().join(", ")
    )
}

fn scenario_instruction(scenario: &ScenarioContext) -> String {
    let mut out = format!(
        "\nExercice en cours : {} (étape « {} » — {}).\nConsigne de l'étape : {}",
        scenario.scenario_name,
        scenario.step_name,
        scenario.step_description,
        scenario.rendered_prompt
    );

    if !scenario.expected_variables.is_empty() {
        out.push_str(&format!(
            "\nInformations à obtenir du participant : {}.",
            scenario.expected_variables.join(", ")
        ));
    }

    if !scenario.variables.is_empty() {
        if let Ok(vars) = serde_json::to_string(&scenario.variables) {
            out.push_str(&format!("\nInformations déjà connues : {}.", vars));
        }
    }

    if scenario.is_complete {
        out.push_str("\nL'exercice est terminé : conclus chaleureusement.");
    } else if !scenario.possible_next_steps.is_empty() {
        out.push_str(&format!(
            "\nQuand l'étape est accomplie, ajoute dans ta réponse une ligne \
             [SCENARIO_UPDATE: {{\"next_step\": \"<id>\", \"variables\": {{...}}}}] \
             avec l'un de : {}.",
            scenario.possible_next_steps.join(", ")
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scenario_context() -> ScenarioContext {
        ScenarioContext {
            scenario_name: "Simulation d'entretien".to_string(),
            goal: Some("Pratiquer".to_string()),
            step_name: "Introduction".to_string(),
            step_description: "Se presenter".to_string(),
            rendered_prompt: "Demande au candidat de se presenter.".to_string(),
            expected_variables: vec!["name".to_string()],
            possible_next_steps: vec!["experience".to_string()],
            is_complete: false,
            variables: HashMap::new(),
        }
    }

    fn base_ctx<'a>(history: &'a [ChatMessage]) -> PromptContext<'a> {
        PromptContext {
            language: Language::Fr,
            goal: None,
            scenario: None,
            history,
            history_window: 6,
            interrupted: false,
            continuity: None,
            agent_prompt: None,
        }
    }

    #[test]
    fn test_history_window_is_bounded() {
        let history: Vec<ChatMessage> =
            (0..10).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        let messages = build_turn_messages(&base_ctx(&history));

        // 1 system message + last 6 history entries
        assert_eq!(messages.len(), 7);
        assert_eq!(messages[1].content, "m4");
        assert_eq!(messages[6].content, "m9");
    }

    #[test]
    fn test_system_names_emotion_vocabulary() {
        let messages = build_turn_messages(&base_ctx(&[]));
        let system = &messages[0].content;
        assert!(system.contains("[EMOTION: <tag>]"));
        assert!(system.contains("enthousiasme_modere"));
    }

    #[test]
    fn test_scenario_section_included() {
        let scenario = scenario_context();
        let mut ctx = base_ctx(&[]);
        ctx.scenario = Some(&scenario);

        let system = &build_turn_messages(&ctx)[0].content;
        assert!(system.contains("Simulation d'entretien"));
        assert!(system.contains("SCENARIO_UPDATE"));
        assert!(system.contains("experience"));
    }

    #[test]
    fn test_interruption_instruction_takes_precedence() {
        let entry = ContinuityEntry {
            topic: "le sujet".to_string(),
            last_reply: String::new(),
            importance: 0.5,
            saved_at: std::time::Instant::now(),
            interruption_count: 1,
        };
        let mut ctx = base_ctx(&[]);
        ctx.interrupted = true;
        ctx.continuity = Some((&entry, InterruptionKind::General));

        let system = &build_turn_messages(&ctx)[0].content;
        assert!(system.contains("interrompre"));
        assert!(!system.contains("Reprends naturellement"));
    }

    #[test]
    fn test_continuity_phrase_spliced_when_not_interrupted() {
        let entry = ContinuityEntry {
            topic: "ton parcours".to_string(),
            last_reply: String::new(),
            importance: 0.5,
            saved_at: std::time::Instant::now(),
            interruption_count: 1,
        };
        let mut ctx = base_ctx(&[]);
        ctx.continuity = Some((&entry, InterruptionKind::Question));

        let system = &build_turn_messages(&ctx)[0].content;
        assert!(system.contains("ton parcours"));
    }

    #[test]
    fn test_gentle_prompt_is_minimal() {
        let messages = build_gentle_prompt_messages(Language::Fr, None);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("pause"));
    }
}
