//! Conversation-continuity memory
//!
//! When a reply is interrupted we remember what was being discussed so the
//! next non-interrupted reply can pick the thread back up instead of
//! ignoring the derailment. One entry per session, overwritten on each
//! interruption, evicted after a TTL.

use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::time::{Duration, Instant};

use parlo_config::constants::continuity;
use parlo_core::{ChatMessage, MessageRole};

/// What kind of interruption cut the reply off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
    /// The participant broke in with a question
    Question,
    /// The participant broke in with a remark
    Comment,
    /// Anything else
    General,
}

/// Stored context for one session's last interruption.
#[derive(Debug, Clone)]
pub struct ContinuityEntry {
    pub topic: String,
    pub last_reply: String,
    pub importance: f32,
    pub saved_at: Instant,
    /// How many times this session has interrupted so far
    pub interruption_count: u32,
}

/// Per-session interruption context store.
pub struct ContinuityMemory {
    entries: DashMap<String, ContinuityEntry>,
    ttl: Duration,
}

impl Default for ContinuityMemory {
    fn default() -> Self {
        Self::new(Duration::from_secs(continuity::TTL_SECS))
    }
}

impl ContinuityMemory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Store the interrupted topic. Overwrites any prior entry for the
    /// session and bumps its interruption counter.
    pub fn save(
        &self,
        session_id: &str,
        topic: impl Into<String>,
        last_reply: impl Into<String>,
        importance: f32,
    ) {
        let count = self
            .entries
            .get(session_id)
            .map(|e| e.interruption_count)
            .unwrap_or(0);

        self.entries.insert(
            session_id.to_string(),
            ContinuityEntry {
                topic: topic.into(),
                last_reply: last_reply.into(),
                importance: importance.clamp(0.0, 1.0),
                saved_at: Instant::now(),
                interruption_count: count + 1,
            },
        );
    }

    /// Current entry for a session, evicting it when stale.
    pub fn get(&self, session_id: &str) -> Option<ContinuityEntry> {
        let entry = {
            let entry = self.entries.get(session_id)?;
            entry.value().clone()
        };
        if entry.saved_at.elapsed() > self.ttl {
            self.entries.remove(session_id);
            return None;
        }
        Some(entry)
    }

    /// Explicit eviction.
    pub fn clear(&self, session_id: &str) {
        self.entries.remove(session_id);
    }

    /// Derive a short topic string from the tail of a conversation.
    ///
    /// Takes the most recent user message among the last `max_messages`
    /// and truncates it at a word boundary. Deliberately not semantic.
    pub fn extract_topic(history: &[ChatMessage], max_messages: usize) -> Option<String> {
        let window_start = history.len().saturating_sub(max_messages);
        let last_user = history[window_start..]
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .or_else(|| history[window_start..].last())?;

        let text = last_user.content.trim();
        if text.is_empty() {
            return None;
        }

        const TOPIC_MAX_CHARS: usize = 80;
        if text.chars().count() <= TOPIC_MAX_CHARS {
            return Some(text.to_string());
        }

        let truncated: String = text.chars().take(TOPIC_MAX_CHARS).collect();
        let cut = truncated.rfind(' ').unwrap_or(truncated.len());
        Some(format!("{}…", &truncated[..cut]))
    }

    /// Candidate resumption phrases for an entry, selected by interruption
    /// kind and escalated once the session keeps interrupting.
    pub fn continuity_phrases(entry: &ContinuityEntry, kind: InterruptionKind) -> Vec<String> {
        let topic = &entry.topic;
        let escalated = entry.interruption_count > continuity::ESCALATION_COUNT;

        if escalated {
            return vec![
                format!(
                    "Je vois que tu as beaucoup de choses à dire ! Essayons quand même de terminer sur {topic}."
                ),
                format!("Reprenons une dernière fois : {topic}."),
            ];
        }

        match kind {
            InterruptionKind::Question => vec![
                format!("Bonne question ! Pour y revenir, nous parlions de {topic}."),
                format!("Je réponds, puis revenons à {topic}."),
            ],
            InterruptionKind::Comment => vec![
                format!("Merci pour ta remarque. Revenons à {topic}."),
                format!("C'est noté ! Là où nous en étions : {topic}."),
            ],
            InterruptionKind::General => vec![
                format!("Reprenons : {topic}."),
                format!("Revenons à ce que nous disions sur {topic}."),
            ],
        }
    }

    /// Pick one phrase for the prompt builder.
    pub fn pick_phrase(entry: &ContinuityEntry, kind: InterruptionKind) -> String {
        let phrases = Self::continuity_phrases(entry, kind);
        phrases
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}
