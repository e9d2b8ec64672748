//! `StateSave` (§4.2): the terminal stage of every canonical chain.
//! Collects the `StructuredMessage` elements a turn produced and appends
//! them to the conversation's store, preferring an atomic
//! `MessageAppender::append_messages` over a full optimistic-locked
//! `save` when the backend offers one — mirroring `StateLoad`'s own
//! capability probe.

use std::sync::Arc;

use async_trait::async_trait;

use pk_domain::{ElementPayload, Message, Result, StreamElement};
use pk_state::ConversationStore;

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};

pub struct StateSave {
    store: Arc<dyn ConversationStore>,
}

impl StateSave {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    async fn persist(&self, id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        if let Some(appender) = self.store.as_message_appender() {
            return appender.append_messages(id, messages).await;
        }
        let mut state = self.store.load(id).await.unwrap_or_else(|_| pk_domain::ConversationState::new(id));
        let expected = Some(state.version);
        state.messages.extend_from_slice(messages);
        self.store.save(&state, expected).await
    }
}

#[async_trait]
impl Stage for StateSave {
    fn name(&self) -> &str {
        "state_save"
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let mut produced = Vec::new();

        while let Some(element) = input.recv().await {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            if let ElementPayload::StructuredMessage(message) = &element.payload {
                produced.push(message.clone());
            }
            if output.send(element).await.is_err() {
                return Ok(());
            }
        }

        self.persist(&ctx.conversation_id, &produced).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pk_domain::Role;
    use pk_state::InMemoryStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn persists_structured_messages_via_appender() {
        let store = Arc::new(InMemoryStore::new());
        let stage = StateSave::new(store.clone());
        let ctx = StageContext::new("conv-1", Default::default(), Arc::new(crate::event_bus::EventBus::new()));
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(4);

        input_tx.send(StreamElement::new(ElementPayload::StructuredMessage(Message::user("hi")), 0)).await.unwrap();
        input_tx.send(StreamElement::new(ElementPayload::StructuredMessage(Message::assistant("hello")), 0)).await.unwrap();
        drop(input_tx);

        stage.process(&ctx, input_rx, output_tx).await.unwrap();
        while output_rx.recv().await.is_some() {}

        let state = store.load("conv-1").await.unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn empty_turn_is_a_noop() {
        let store = Arc::new(InMemoryStore::new());
        let stage = StateSave::new(store.clone());
        let ctx = StageContext::new("conv-1", Default::default(), Arc::new(crate::event_bus::EventBus::new()));
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(4);
        drop(input_tx);

        stage.process(&ctx, input_rx, output_tx).await.unwrap();
        while output_rx.recv().await.is_some() {}

        assert!(matches!(store.load("conv-1").await, Err(pk_domain::Error::NotFound(_))));
    }
}
