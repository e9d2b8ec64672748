//! `Recording` (§4.2): an observe-only stage that forwards every element
//! unchanged while publishing domain events about what passed through —
//! `message.created`-equivalent lifecycle events, tool-call starts, media
//! arrivals, and stream interruptions. Unlike `ProviderStage`, which
//! already knows enough (latency, dispatch outcome) to publish its own
//! fine-grained events, `Recording` is for chains where no other stage is
//! positioned to observe a given element kind — insert it wherever a
//! mode's chain wants an audit trail without changing stage semantics.

use async_trait::async_trait;

use pk_domain::{ElementPayload, EventKind, Result};

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::stages::tts::INTERRUPT_METADATA_KEY;

pub struct Recording;

impl Recording {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    fn kind(&self) -> StageKind {
        StageKind::Observe
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        while let Some(element) = input.recv().await {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }

            if element.metadata.contains_key(INTERRUPT_METADATA_KEY) {
                ctx.publish(EventKind::TtsInterrupted);
                ctx.publish(EventKind::Custom {
                    name: "stream.interrupted".into(),
                    data: Default::default(),
                });
            } else {
                match &element.payload {
                    ElementPayload::StructuredMessage(message) => {
                        ctx.publish(EventKind::MessageCreated {
                            role: format!("{:?}", message.role).to_lowercase(),
                        });
                    }
                    ElementPayload::ToolCall { call_id, tool_name, .. } => {
                        ctx.publish(EventKind::ToolCallStarted {
                            call_id: call_id.clone(),
                            tool_name: tool_name.clone(),
                        });
                    }
                    ElementPayload::AudioChunk { .. } | ElementPayload::VideoChunk { .. } | ElementPayload::Image { .. } => {
                        ctx.publish(EventKind::Custom {
                            name: "media.chunk_observed".into(),
                            data: Default::default(),
                        });
                    }
                    _ => {}
                }
            }

            if output.send(element).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
