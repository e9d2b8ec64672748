//! `TextToSpeech`/`Tts` (§4.2): the 1:N text-to-audio stage in the VAD
//! chain. Synthesizes one assistant turn into a sequence of audio chunks,
//! watching for a barge-in (new input arriving while audio is still
//! playing) between chunks so a user talking over the assistant cuts
//! playback short rather than queuing behind it.
//!
//! `ElementPayload` has no dedicated "interrupt" variant — signalling an
//! interruption downstream reuses the same metadata-tagging convention
//! `StateLoad` uses for its snapshot handoff: an element carrying
//! [`INTERRUPT_METADATA_KEY`] is a control signal, not content.

use async_trait::async_trait;

use pk_domain::{ElementPayload, EventKind, Result, StreamElement};

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::time::now_ms;

pub const INTERRUPT_METADATA_KEY: &str = "interrupt";

/// A speech synthesis backend. `Tts` depends only on this trait, never on
/// a concrete vendor SDK.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesizes `text` into ordered audio chunks at `sample_rate_hz`.
    async fn synthesize(&self, text: &str) -> Result<Vec<Vec<u8>>>;

    fn sample_rate_hz(&self) -> u32;
}

/// Deterministic fixture: each whitespace-separated word becomes one
/// "audio" chunk whose bytes are just the word's own UTF-8 bytes, so
/// tests can assert on chunk count and content without decoding audio.
pub struct MockTextToSpeech {
    sample_rate_hz: u32,
}

impl MockTextToSpeech {
    pub fn new() -> Self {
        Self { sample_rate_hz: 16_000 }
    }
}

impl Default for MockTextToSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextToSpeech for MockTextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<Vec<u8>>> {
        Ok(text.split_whitespace().map(|word| word.as_bytes().to_vec()).collect())
    }

    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
}

pub struct Tts {
    backend: std::sync::Arc<dyn TextToSpeech>,
}

impl Tts {
    pub fn new(backend: std::sync::Arc<dyn TextToSpeech>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for Tts {
    fn name(&self) -> &str {
        "tts"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        while let Some(element) = input.recv().await {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            if element.metadata.contains_key(INTERRUPT_METADATA_KEY) {
                continue;
            }
            let Some(text) = element.as_text() else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            ctx.publish(EventKind::TtsStarted);
            let chunks = self.backend.synthesize(&text).await?;
            let sample_rate_hz = self.backend.sample_rate_hz();

            let mut interrupted = false;
            for chunk in chunks {
                // A barge-in arriving while this turn is still playing cuts
                // it short rather than queuing behind it.
                if let Ok(next) = input.try_recv() {
                    if next.metadata.contains_key(INTERRUPT_METADATA_KEY) || next.as_text().is_some() {
                        interrupted = true;
                        break;
                    }
                }
                let audio_element = StreamElement::new(ElementPayload::AudioChunk { data: chunk, sample_rate_hz }, now_ms());
                if output.send(audio_element).await.is_err() {
                    return Ok(());
                }
            }

            if interrupted {
                ctx.publish(EventKind::TtsInterrupted);
                let marker = StreamElement::text("", now_ms()).with_metadata(INTERRUPT_METADATA_KEY, serde_json::json!(true));
                if output.send(marker).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
