//! `SpeechToText`/`Stt` (§4.2): the N:1 audio-to-text stage in the VAD
//! chain. Sits downstream of `AudioTurn` and transcribes one already-closed
//! turn's worth of audio chunks into a single text element, publishing
//! `SttCompleted{text_len}` so observers can track transcription without
//! seeing the raw audio.

use async_trait::async_trait;

use pk_domain::{ElementPayload, EventKind, Result, StreamElement};

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::time::now_ms;

/// A transcription backend. `Stt` depends only on this trait, never on a
/// concrete vendor SDK.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribes one turn's ordered audio chunks into text.
    async fn transcribe(&self, chunks: &[Vec<u8>], sample_rate_hz: u32) -> Result<String>;
}

/// Deterministic fixture: concatenates each chunk's bytes back into a
/// UTF-8 string, the inverse of `MockTextToSpeech`'s word-per-chunk split.
pub struct MockSpeechToText;

impl MockSpeechToText {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockSpeechToText {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn transcribe(&self, chunks: &[Vec<u8>], _sample_rate_hz: u32) -> Result<String> {
        let words: Vec<String> = chunks
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        Ok(words.join(" "))
    }
}

pub struct Stt {
    backend: std::sync::Arc<dyn SpeechToText>,
}

impl Stt {
    pub fn new(backend: std::sync::Arc<dyn SpeechToText>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Stage for Stt {
    fn name(&self) -> &str {
        "stt"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut sample_rate_hz = 0u32;

        while let Some(element) = input.recv().await {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            match element.payload {
                ElementPayload::AudioChunk { data, sample_rate_hz: rate } => {
                    chunks.push(data);
                    sample_rate_hz = rate;
                }
                other => {
                    // Anything that isn't audio (e.g. a turn-closed marker)
                    // passes straight through unchanged.
                    if output.send(StreamElement::new(other, now_ms())).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        if chunks.is_empty() {
            return Ok(());
        }

        let text = self.backend.transcribe(&chunks, sample_rate_hz).await?;
        ctx.publish(EventKind::SttCompleted { text_len: text.len() });
        let _ = output.send(StreamElement::text(text, now_ms())).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn transcribes_accumulated_audio_chunks() {
        let stage = Stt::new(std::sync::Arc::new(MockSpeechToText::new()));
        let ctx = StageContext::new("conv-1", Default::default(), std::sync::Arc::new(crate::event_bus::EventBus::new()));
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(4);

        input_tx
            .send(StreamElement::new(
                ElementPayload::AudioChunk { data: b"hello".to_vec(), sample_rate_hz: 16_000 },
                0,
            ))
            .await
            .unwrap();
        input_tx
            .send(StreamElement::new(
                ElementPayload::AudioChunk { data: b"world".to_vec(), sample_rate_hz: 16_000 },
                0,
            ))
            .await
            .unwrap();
        drop(input_tx);

        stage.process(&ctx, input_rx, output_tx).await.unwrap();

        let transcribed = output_rx.recv().await.unwrap();
        assert_eq!(transcribed.as_text().as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn no_audio_produces_no_output() {
        let stage = Stt::new(std::sync::Arc::new(MockSpeechToText::new()));
        let ctx = StageContext::new("conv-1", Default::default(), std::sync::Arc::new(crate::event_bus::EventBus::new()));
        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(4);
        drop(input_tx);

        stage.process(&ctx, input_rx, output_tx).await.unwrap();
        assert!(output_rx.recv().await.is_none());
    }
}
