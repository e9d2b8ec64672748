//! In-memory Conversation State Store: a mutex-guarded map, the
//! required backend for local/single-process use and for tests.
//! Grounded in the teacher's `sessions::store::SessionStore`, whose own
//! `RwLock<HashMap<String, SessionEntry>>` is the same "single mutex
//! guarded map" shape the spec calls for — swapped here to
//! `parking_lot::Mutex` since every access here is a read-modify-write.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use pk_domain::{ConversationState, Error, Message, Result, Summary};

use crate::traits::{ConversationStore, MessageAppender, MessageReader, SummaryAccessor};

pub struct InMemoryStore {
    states: Mutex<HashMap<String, ConversationState>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn load(&self, id: &str) -> Result<ConversationState> {
        self.states
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conversation '{id}' not found")))
    }

    async fn save(&self, state: &ConversationState, expected_version: Option<u64>) -> Result<()> {
        let mut states = self.states.lock();
        if let Some(expected) = expected_version {
            let found = states.get(&state.id).map(|s| s.version).unwrap_or(0);
            if found != expected {
                return Err(Error::VersionMismatch {
                    id: state.id.clone(),
                    expected,
                    found,
                });
            }
        }
        states.insert(state.id.clone(), state.clone());
        Ok(())
    }

    async fn fork(&self, source_id: &str, new_id: &str) -> Result<()> {
        let mut states = self.states.lock();
        if states.contains_key(new_id) {
            return Err(Error::InvalidRequest(format!(
                "conversation '{new_id}' already exists"
            )));
        }
        let source = states
            .get(source_id)
            .ok_or_else(|| Error::NotFound(format!("conversation '{source_id}' not found")))?;
        let forked = source.fork(new_id);
        states.insert(new_id.to_string(), forked);
        Ok(())
    }

    fn as_message_reader(&self) -> Option<&dyn MessageReader> {
        Some(self)
    }

    fn as_message_appender(&self) -> Option<&dyn MessageAppender> {
        Some(self)
    }

    fn as_summary_accessor(&self) -> Option<&dyn SummaryAccessor> {
        Some(self)
    }
}

#[async_trait]
impl MessageReader for InMemoryStore {
    async fn load_recent_messages(&self, id: &str, n: usize) -> Result<Vec<Message>> {
        let states = self.states.lock();
        let state = states
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("conversation '{id}' not found")))?;
        let start = state.messages.len().saturating_sub(n);
        Ok(state.messages[start..].to_vec())
    }

    async fn message_count(&self, id: &str) -> Result<usize> {
        let states = self.states.lock();
        Ok(states.get(id).map(|s| s.messages.len()).unwrap_or(0))
    }
}

#[async_trait]
impl MessageAppender for InMemoryStore {
    async fn append_messages(&self, id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut states = self.states.lock();
        let state = states
            .entry(id.to_string())
            .or_insert_with(|| ConversationState::new(id));
        state.messages.extend_from_slice(messages);
        state.version += 1;
        Ok(())
    }
}

#[async_trait]
impl SummaryAccessor for InMemoryStore {
    async fn load_summaries(&self, id: &str) -> Result<Vec<Summary>> {
        let states = self.states.lock();
        Ok(states.get(id).map(|s| s.summaries.clone()).unwrap_or_default())
    }

    async fn save_summary(&self, id: &str, summary: Summary) -> Result<()> {
        let mut states = self.states.lock();
        let state = states
            .entry(id.to_string())
            .or_insert_with(|| ConversationState::new(id));
        state.summaries.push(summary);
        Ok(())
    }
}
