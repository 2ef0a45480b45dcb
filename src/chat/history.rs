// src/chat/history.rs — Turn records and context assembly
//
// History is an ordered array of entries alternating user, assistant.
// "tokens" is deliberately the character count of the content; the
// context budget below inherits that proxy.

use serde::{Deserialize, Serialize};

use crate::provider::WireMessage;
use crate::search::SearchHit;
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEntry {
    pub id: String,
    pub role: EntryRole,
    pub content: String,
    /// Reasoning prefix streamed before the answer (assistant only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub doc_files: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
    pub create_time: i64,
    pub create_at: String,
    /// Coarse token proxy: character count of `content`.
    pub tokens: usize,
    /// Free-form upstream statistics surfaced to the UI.
    #[serde(default)]
    pub stat: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_result: Option<Vec<SearchHit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

impl TurnEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(EntryRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(EntryRole::Assistant, content.into())
    }

    fn new(role: EntryRole, content: String) -> Self {
        let tokens = content.chars().count();
        Self {
            id: util::new_id(),
            role,
            content,
            reasoning: None,
            doc_files: Vec::new(),
            images: Vec::new(),
            tool_calls: None,
            create_time: util::now_secs(),
            create_at: util::wall_clock(),
            tokens,
            stat: serde_json::Map::new(),
            search_result: None,
            search_type: None,
            search_query: None,
        }
    }
}

/// Index regeneration truncates at: the start of the turn containing
/// `entry_id`. Returns `None` when the id is unknown.
pub fn regenerate_cut_index(history: &[TurnEntry], entry_id: &str) -> Option<usize> {
    let pos = history.iter().rposition(|e| e.id == entry_id)?;
    if history[pos].role == EntryRole::Assistant && pos > 0 {
        Some(pos - 1)
    } else {
        Some(pos)
    }
}

/// Assemble the wire context: historical entries trimmed oldest-first to a
/// character budget of half the context length, then the current user
/// content (always included, never counted against the history budget).
pub fn assemble_context(
    history: &[TurnEntry],
    current_user: &str,
    context_length: usize,
) -> Vec<WireMessage> {
    let budget = context_length / 2;

    let mut kept: Vec<&TurnEntry> = Vec::new();
    let mut used = 0usize;
    for entry in history.iter().rev() {
        let cost = entry.content.chars().count();
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(entry);
    }
    kept.reverse();

    let mut messages: Vec<WireMessage> = kept
        .iter()
        .map(|e| match e.role {
            EntryRole::User => WireMessage::user(e.content.clone()),
            EntryRole::Assistant => WireMessage::assistant(e.content.clone()),
        })
        .collect();
    messages.push(WireMessage::user(current_user.to_string()));
    messages
}
