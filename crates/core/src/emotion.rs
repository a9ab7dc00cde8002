//! Emotion vocabulary
//!
//! The generation backend is instructed to end every reply with a line of
//! the exact form `[EMOTION: <tag>]`. The vocabulary below is the closed
//! set the synthesis voice selection understands; anything else degrades to
//! `neutre`.

use serde::{Deserialize, Serialize};

/// Target emotion for a spoken reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Encouragement,
    Empathie,
    #[default]
    Neutre,
    EnthousiasmeModere,
    Curiosite,
    Reflexion,
}

impl Emotion {
    /// Tag string as it appears in the generation protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Encouragement => "encouragement",
            Emotion::Empathie => "empathie",
            Emotion::Neutre => "neutre",
            Emotion::EnthousiasmeModere => "enthousiasme_modere",
            Emotion::Curiosite => "curiosite",
            Emotion::Reflexion => "reflexion",
        }
    }

    /// Parse a tag; `None` for anything outside the vocabulary.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "encouragement" => Some(Emotion::Encouragement),
            "empathie" => Some(Emotion::Empathie),
            "neutre" => Some(Emotion::Neutre),
            "enthousiasme_modere" => Some(Emotion::EnthousiasmeModere),
            "curiosite" => Some(Emotion::Curiosite),
            "reflexion" => Some(Emotion::Reflexion),
            _ => None,
        }
    }

    /// Every tag, in protocol order, for the system instruction.
    pub fn vocabulary() -> [&'static str; 6] {
        [
            "encouragement",
            "empathie",
            "neutre",
            "enthousiasme_modere",
            "curiosite",
            "reflexion",
        ]
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known() {
        assert_eq!(Emotion::parse("encouragement"), Some(Emotion::Encouragement));
        assert_eq!(
            Emotion::parse(" Enthousiasme_Modere "),
            Some(Emotion::EnthousiasmeModere)
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(Emotion::parse("joyeux"), None);
    }

    #[test]
    fn test_default_is_neutre() {
        assert_eq!(Emotion::default(), Emotion::Neutre);
    }
}
