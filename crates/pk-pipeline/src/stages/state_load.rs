//! `StateLoad` (§4.2): reads the conversation's prior state — preferring
//! a backend's `MessageReader`/`SummaryAccessor` tail read over a full
//! `load` when both are available — and hands it to `ContextAssembly` as
//! a single snapshot element ahead of the turn's new input.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use pk_domain::{ConversationState, Error, ElementPayload, Result, StreamElement};
use pk_state::ConversationStore;

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::time::now_ms;

pub const STATE_SNAPSHOT_KIND: &str = "state_snapshot";
pub const CONVERSATION_STATE_KEY: &str = "conversation_state";

pub struct StateLoad {
    store: Arc<dyn ConversationStore>,
    hot_window: usize,
}

impl StateLoad {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store, hot_window: 200 }
    }

    pub fn with_hot_window(mut self, hot_window: usize) -> Self {
        self.hot_window = hot_window;
        self
    }

    async fn load_state(&self, id: &str) -> Result<ConversationState> {
        if let (Some(reader), Some(summaries)) =
            (self.store.as_message_reader(), self.store.as_summary_accessor())
        {
            let mut state = ConversationState::new(id);
            state.messages = reader.load_recent_messages(id, self.hot_window).await?;
            state.summaries = summaries.load_summaries(id).await?;
            return Ok(state);
        }
        match self.store.load(id).await {
            Ok(state) => Ok(state),
            Err(Error::NotFound(_)) => Ok(ConversationState::new(id)),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Stage for StateLoad {
    fn name(&self) -> &str {
        "state_load"
    }

    fn kind(&self) -> StageKind {
        StageKind::Generate
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let state = self.load_state(&ctx.conversation_id).await?;
        let snapshot = StreamElement::new(ElementPayload::Text(String::new()), now_ms())
            .with_metadata("kind", json!(STATE_SNAPSHOT_KIND))
            .with_metadata(CONVERSATION_STATE_KEY, serde_json::to_value(&state)?);
        if output.send(snapshot).await.is_err() {
            return Ok(());
        }

        while let Some(element) = input.recv().await {
            if ctx.cancel.is_cancelled() {
                break;
            }
            if output.send(element).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pk_state::InMemoryStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn fresh_conversation_loads_as_empty_state() {
        let stage = StateLoad::new(Arc::new(InMemoryStore::new()));
        let ctx = StageContext::new("conv-1", Default::default(), Arc::new(crate::event_bus::EventBus::new()));
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(4);
        input_tx.send(StreamElement::text("hi", 0)).await.unwrap();
        drop(input_tx);

        stage.process(&ctx, input_rx, output_tx).await.unwrap();

        let snapshot = output_rx.recv().await.unwrap();
        let state: ConversationState =
            serde_json::from_value(snapshot.metadata.get(CONVERSATION_STATE_KEY).unwrap().clone()).unwrap();
        assert!(state.messages.is_empty());

        let forwarded = output_rx.recv().await.unwrap();
        assert_eq!(forwarded.as_text().as_deref(), Some("hi"));
    }
}
