//! Generation-reply directive parsing
//!
//! The generation backend embeds two directives in free text:
//! a trailing `[EMOTION: <tag>]` line and an optional
//! `[SCENARIO_UPDATE: {...}]` block anywhere in the reply. Parsing is kept
//! in exactly one function per directive kind, with an explicit
//! "not found" result distinct from "malformed".

use once_cell::sync::Lazy;
use regex::Regex;

use parlo_core::Emotion;
use parlo_scenario::ScenarioUpdate;

/// Result of looking for a directive in a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveOutcome<T> {
    Found(T),
    NotFound,
    /// A directive marker was present but its payload did not parse.
    Malformed,
}

impl<T> DirectiveOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            DirectiveOutcome::Found(v) => Some(v),
            _ => None,
        }
    }
}

/// A reply with its emotion tag stripped and resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionReply {
    /// Reply text without the tag line
    pub text: String,
    /// Resolved emotion; `neutre` when absent or unknown
    pub emotion: Emotion,
    pub outcome: DirectiveOutcome<Emotion>,
}

static EMOTION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\s*\[EMOTION:\s*([^\]]*)\]\s*\z").unwrap());

/// Strip and resolve the trailing `[EMOTION: …]` line.
///
/// Unknown tags resolve to `neutre` but the tag line is still removed —
/// it must never be spoken. A reply with no tag at all also resolves to
/// `neutre` (the backend contract requires the tag, so its absence is
/// logged, not failed).
pub fn parse_emotion(raw: &str) -> EmotionReply {
    match EMOTION_TAG.captures(raw) {
        Some(caps) => {
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let text = EMOTION_TAG.replace(raw, "").trim_end().to_string();
            match Emotion::parse(tag) {
                Some(emotion) => EmotionReply {
                    text,
                    emotion,
                    outcome: DirectiveOutcome::Found(emotion),
                },
                None => {
                    tracing::warn!(tag = %tag, "unknown emotion tag, falling back to neutre");
                    EmotionReply {
                        text,
                        emotion: Emotion::Neutre,
                        outcome: DirectiveOutcome::Malformed,
                    }
                }
            }
        }
        None => {
            tracing::warn!("generation reply carried no emotion tag");
            EmotionReply {
                text: raw.trim_end().to_string(),
                emotion: Emotion::Neutre,
                outcome: DirectiveOutcome::NotFound,
            }
        }
    }
}

const SCENARIO_MARKER: &str = "[SCENARIO_UPDATE:";

/// Extract the `[SCENARIO_UPDATE: {...}]` block, wherever it appears.
///
/// Returns the reply text with the block removed plus the parse outcome.
/// Malformed JSON is ignored (never fatal); the block is removed from the
/// text regardless so directive syntax never reaches synthesis.
pub fn parse_scenario_update(raw: &str) -> (String, DirectiveOutcome<ScenarioUpdate>) {
    let Some(marker_at) = raw.find(SCENARIO_MARKER) else {
        return (raw.to_string(), DirectiveOutcome::NotFound);
    };

    let after_marker = &raw[marker_at + SCENARIO_MARKER.len()..];
    let Some(json_range) = balanced_json_object(after_marker) else {
        // Marker with no parseable object: drop the marker's line
        let line_end = raw[marker_at..]
            .find('\n')
            .map(|i| marker_at + i)
            .unwrap_or(raw.len());
        let mut text = String::with_capacity(raw.len());
        text.push_str(&raw[..marker_at]);
        text.push_str(&raw[line_end..]);
        tracing::warn!("scenario-update marker without JSON payload, ignoring");
        return (tidy(text), DirectiveOutcome::Malformed);
    };

    let json = &after_marker[json_range.clone()];
    let close = after_marker[json_range.end..]
        .find(']')
        .map(|i| marker_at + SCENARIO_MARKER.len() + json_range.end + i + 1)
        .unwrap_or(marker_at + SCENARIO_MARKER.len() + json_range.end);

    let mut text = String::with_capacity(raw.len());
    text.push_str(&raw[..marker_at]);
    text.push_str(&raw[close..]);
    let text = tidy(text);

    match serde_json::from_str::<ScenarioUpdate>(json) {
        Ok(update) => (text, DirectiveOutcome::Found(update)),
        Err(e) => {
            tracing::warn!(error = %e, "malformed scenario-update JSON, ignoring");
            (text, DirectiveOutcome::Malformed)
        }
    }
}

/// Byte range of the first balanced `{...}` object in `s`.
///
/// Brace counting respects JSON string literals so payload values may
/// contain braces.
fn balanced_json_object(s: &str) -> Option<std::ops::Range<usize>> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start..start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn tidy(text: String) -> String {
    text.trim().to_string()
}
