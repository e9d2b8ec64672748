//! [`Conversation`]: "the per-user, per-session handle that owns one
//! state id, a pipeline factory, and a hook set." Everything this type
//! does is delegate into collaborators `ConversationBuilder::build`
//! already wired; `Conversation` itself holds no pipeline logic of its
//! own beyond translating a failed run into the terminal error element
//! callers are guaranteed to see.

use std::sync::Arc;

use tokio::sync::mpsc;

use pk_domain::{ElementPayload, Message, Result};
use pk_domain::{ConversationOptions, StreamElement};
use pk_hooks::HookRegistry;
use pk_pipeline::{EventBus, Mode, Pipeline, DEFAULT_BUFFER_SIZE};
use pk_providers::Provider;
use pk_state::ConversationStore;

use crate::stream::ConversationStream;

/// An open conversation: one state id, bound to one assembled pipeline
/// and one hook set, ready to accept turns via [`Conversation::send`].
pub struct Conversation {
    id: String,
    mode: Mode,
    options: ConversationOptions,
    pipeline: Arc<Pipeline>,
    store: Arc<dyn ConversationStore>,
    hooks: Arc<HookRegistry>,
    provider: Arc<dyn Provider>,
    events: Arc<EventBus>,
}

impl Conversation {
    pub(crate) fn new(
        id: String,
        mode: Mode,
        options: ConversationOptions,
        pipeline: Arc<Pipeline>,
        store: Arc<dyn ConversationStore>,
        hooks: Arc<HookRegistry>,
        provider: Arc<dyn Provider>,
        events: Arc<EventBus>,
    ) -> Self {
        Self { id, mode, options, pipeline, store, hooks, provider, events }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn options(&self) -> &ConversationOptions {
        &self.options
    }

    /// Subscribe to this conversation's lifecycle and domain events
    /// (`pipeline.*`, `stage.*`, and whatever custom events individual
    /// stages publish). Late subscribers miss events published before
    /// they called this.
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Feeds `elements` into a fresh run of the conversation's pipeline
    /// and returns the stream of elements it produces. The input channel
    /// closes as soon as `elements` is drained, which is what lets
    /// `AudioTurn` close a VAD turn on channel closure without an
    /// explicit end-of-turn element.
    ///
    /// A pipeline run that fails (hook denial aside, since that already
    /// surfaces as an ordinary `HookDenied`-tagged element) closes the
    /// returned stream only after appending one terminal
    /// `ElementPayload::Error` element, per the error-handling design's
    /// channel-close-is-end-of-stream rule.
    pub async fn send(&self, elements: Vec<StreamElement>) -> Result<ConversationStream> {
        self.hooks.run_session_turn_update(&self.id).await?;

        let (input_tx, input_rx) = mpsc::channel(DEFAULT_BUFFER_SIZE);
        tokio::spawn(async move {
            for element in elements {
                if input_tx.send(element).await.is_err() {
                    break;
                }
            }
        });

        let (mut output_rx, handle) = self.pipeline.execute(self.id.clone(), self.events.clone(), input_rx)?;
        let cancel = handle.cancel_token();

        let (fwd_tx, fwd_rx) = mpsc::channel(DEFAULT_BUFFER_SIZE);
        let id = self.id.clone();
        tokio::spawn(async move {
            while let Some(element) = output_rx.recv().await {
                if fwd_tx.send(element).await.is_err() {
                    return;
                }
            }
            if let Err(err) = handle.join().await {
                tracing::warn!(conversation_id = %id, error = %err, "pipeline run failed, surfacing terminal error element");
                let _ = fwd_tx
                    .send(StreamElement::new(ElementPayload::Error { message: err.to_string() }, pk_pipeline::time::now_ms()))
                    .await;
            }
        });

        Ok(ConversationStream { receiver: fwd_rx, cancel })
    }

    /// Convenience wrapper over [`Conversation::send`] for a plain-text
    /// turn.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<ConversationStream> {
        self.send(vec![StreamElement::text(text.into(), pk_pipeline::time::now_ms())]).await
    }

    /// Convenience wrapper over [`Conversation::send`] for a turn that's
    /// already a structured [`Message`] (e.g. one carrying image parts).
    pub async fn send_message(&self, message: Message) -> Result<ConversationStream> {
        self.send(vec![StreamElement::new(ElementPayload::StructuredMessage(message), pk_pipeline::time::now_ms())]).await
    }

    /// Convenience wrapper over [`Conversation::send`] for Vad mode:
    /// feeds one `AudioChunk` element per `(bytes, sample_rate_hz)` pair,
    /// relying on the input channel's closure once every chunk has been
    /// sent to let `AudioTurn` close the turn.
    pub async fn send_audio_chunks(&self, chunks: Vec<(Vec<u8>, u32)>) -> Result<ConversationStream> {
        let now = pk_pipeline::time::now_ms();
        let elements = chunks
            .into_iter()
            .map(|(data, sample_rate_hz)| StreamElement::new(ElementPayload::AudioChunk { data, sample_rate_hz }, now))
            .collect();
        self.send(elements).await
    }

    /// Deep-copies this conversation's state under `new_id` and returns
    /// an independent `Conversation` sharing the same pipeline, store,
    /// hooks, provider, and pack, but with its own fresh `EventBus` —
    /// so a fork's lifecycle events never leak into the source
    /// conversation's subscribers.
    pub async fn fork(&self, new_id: impl Into<String>) -> Result<Conversation> {
        let new_id = new_id.into();
        self.store.fork(&self.id, &new_id).await?;
        Ok(Conversation {
            id: new_id,
            mode: self.mode,
            options: self.options.clone(),
            pipeline: self.pipeline.clone(),
            store: self.store.clone(),
            hooks: self.hooks.clone(),
            provider: self.provider.clone(),
            events: Arc::new(EventBus::new()),
        })
    }

    /// Runs session-end hooks and releases the provider's own resources
    /// (connection pools, duplex sockets). A `Conversation` dropped
    /// without calling this never runs `SessionHook::on_end`.
    pub async fn close(&self) -> Result<()> {
        self.hooks.run_session_end(&self.id).await?;
        self.provider.close().await
    }
}
