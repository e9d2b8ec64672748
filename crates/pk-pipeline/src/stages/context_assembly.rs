//! `ContextAssembly` (§4.2): reconstructs the `ConversationState` snapshot
//! `StateLoad` handed across, folds the turn's new input into it, and
//! emits the truncated, budget-fitting message window `pk_contextpack`
//! computed — one `StructuredMessage` element per kept message, in
//! chronological order.

use async_trait::async_trait;

use pk_contextpack::{ContextAssembler, Embedder};
use pk_domain::{ConversationOptions, ConversationState, ElementPayload, Error, Message, Result, StreamElement};

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::stages::state_load::CONVERSATION_STATE_KEY;
use crate::time::now_ms;

pub struct ContextAssembly {
    options: ConversationOptions,
    embedder: Option<std::sync::Arc<dyn Embedder>>,
}

impl ContextAssembly {
    pub fn new(options: ConversationOptions) -> Self {
        Self { options, embedder: None }
    }

    pub fn with_embedder(mut self, embedder: std::sync::Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }
}

#[async_trait]
impl Stage for ContextAssembly {
    fn name(&self) -> &str {
        "context_assembly"
    }

    fn kind(&self) -> StageKind {
        StageKind::Accumulate
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let mut state: Option<ConversationState> = None;
        let mut turn_text_parts: Vec<String> = Vec::new();
        let mut turn_message: Option<Message> = None;

        while let Some(element) = input.recv().await {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            if let Some(raw) = element.metadata.get(CONVERSATION_STATE_KEY) {
                state = Some(serde_json::from_value(raw.clone())?);
                continue;
            }
            match element.payload {
                ElementPayload::StructuredMessage(message) => turn_message = Some(message),
                ElementPayload::Text(text) if !text.is_empty() => turn_text_parts.push(text),
                ElementPayload::Parts(_) => {
                    if let Some(text) = element.as_text() {
                        turn_text_parts.push(text);
                    }
                }
                _ => {}
            }
        }

        let state = state
            .ok_or_else(|| Error::RuntimeInternal("context_assembly received no state snapshot".into()))?;
        let user_input = turn_message.unwrap_or_else(|| Message::user(turn_text_parts.join("\n")));

        let embedder_ref = self.embedder.as_deref();
        let assembler = ContextAssembler::new(embedder_ref);
        let (kept, report) = assembler.assemble(&state, &user_input, &self.options).await;

        ctx.publish(pk_domain::EventKind::Custom {
            name: "context_assembly.report".into(),
            data: [
                ("strategy".to_string(), serde_json::json!(report.strategy)),
                ("kept_messages".to_string(), serde_json::json!(report.kept_messages)),
                ("truncated".to_string(), serde_json::json!(report.truncated)),
            ]
            .into_iter()
            .collect(),
        });

        for message in kept {
            let element = StreamElement::new(ElementPayload::StructuredMessage(message), now_ms());
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
    use crate::stages::state_load::STATE_SNAPSHOT_KIND;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn assembles_loaded_state_with_new_turn() {
        let mut state = ConversationState::new("conv-1");
        state.messages.push(Message::user("earlier"));
        state.messages.push(Message::assistant("reply"));

        let stage = ContextAssembly::new(ConversationOptions::default());
        let ctx = StageContext::new("conv-1", Default::default(), std::sync::Arc::new(crate::event_bus::EventBus::new()));
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(8);

        let snapshot = StreamElement::new(ElementPayload::Text(String::new()), 0)
            .with_metadata("kind", json!(STATE_SNAPSHOT_KIND))
            .with_metadata(CONVERSATION_STATE_KEY, serde_json::to_value(&state).unwrap());
        input_tx.send(snapshot).await.unwrap();
        input_tx.send(StreamElement::text("new question", 0)).await.unwrap();
        drop(input_tx);

        stage.process(&ctx, input_rx, output_tx).await.unwrap();

        let mut kept = Vec::new();
        while let Some(element) = output_rx.recv().await {
            if let ElementPayload::StructuredMessage(message) = element.payload {
                kept.push(message);
            }
        }
        assert_eq!(kept.len(), 3);
        assert_eq!(kept.last().unwrap().content.text(), Some("new question"));
    }
}
