//! Language definitions

use serde::{Deserialize, Serialize};

/// Languages the coaching engine runs sessions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// French (default for coaching exercises)
    #[default]
    Fr,
    /// English
    En,
}

impl Language {
    /// ISO 639-1 code used by the transcription and synthesis backends.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Fr => "fr",
            Language::En => "en",
        }
    }

    /// Parse from a backend language code; unknown codes fall back to French.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" => Language::En,
            _ => Language::Fr,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
