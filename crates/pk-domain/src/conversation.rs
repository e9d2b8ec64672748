use serde::{Deserialize, Serialize};

use crate::message::Message;

/// The durable state a conversation-state store persists for one
/// conversation id. `version` backs the optimistic-lock `Save` variant:
/// a store rejects a `Save` whose `version` does not match the version
/// currently on record with `Error::VersionMismatch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub messages: Vec<Message>,
    /// The system prompt resolved by `PromptAssembly` for the active
    /// prompt, cached here so a reload doesn't need the pack re-resolved.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub summaries: Vec<Summary>,
    /// Running token count across `messages` plus `summaries`, kept in
    /// sync by every append/summarize mutation rather than recomputed.
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub last_accessed_ms: u64,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
    pub version: u64,
}

impl ConversationState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            messages: Vec::new(),
            system_prompt: None,
            summaries: Vec::new(),
            token_count: 0,
            last_accessed_ms: 0,
            metadata: std::collections::HashMap::new(),
            version: 0,
        }
    }

    /// A conversation-scoped copy, freshly versioned, sharing no further
    /// mutable state with the original. Backs the store's `Fork` operation:
    /// appends to the fork must never become visible on the source id.
    pub fn fork(&self, new_id: impl Into<String>) -> Self {
        Self {
            id: new_id.into(),
            user_id: self.user_id.clone(),
            messages: self.messages.clone(),
            system_prompt: self.system_prompt.clone(),
            summaries: self.summaries.clone(),
            token_count: self.token_count,
            last_accessed_ms: self.last_accessed_ms,
            metadata: self.metadata.clone(),
            version: 0,
        }
    }
}

/// A compaction summary replacing (or supplementing, depending on the
/// `summaries_replace_source` configuration) a run of older messages.
/// `[turn_start, turn_end)` is a half-open range over turn indices: no two
/// summaries' ranges may overlap, and the union of all summary ranges plus
/// the live-message tail must cover the whole logical history with no gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub turn_start: usize,
    pub turn_end: usize,
    pub token_count: u64,
    pub created_at_ms: u64,
}

impl Summary {
    pub fn contains(&self, turn_index: usize) -> bool {
        turn_index >= self.turn_start && turn_index < self.turn_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_starts_at_version_zero_and_new_id() {
        let mut state = ConversationState::new("conv-1");
        state.messages.push(Message::user("hi"));
        state.version = 4;

        let fork = state.fork("conv-1-fork");
        assert_eq!(fork.id, "conv-1-fork");
        assert_eq!(fork.version, 0);
        assert_eq!(fork.messages.len(), 1);
    }

    #[test]
    fn fork_is_isolated_from_source() {
        let state = ConversationState::new("conv-1");
        let mut fork = state.fork("conv-1-fork");
        fork.messages.push(Message::user("only in fork"));
        assert!(state.messages.is_empty());
        assert_eq!(fork.messages.len(), 1);
    }
}
