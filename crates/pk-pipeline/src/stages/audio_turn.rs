//! `AudioTurn` (§4.2): the N:1 voice-activity-detection accumulator that
//! opens the VAD chain. Forwards incoming `AudioChunk` elements as they
//! arrive and closes a turn once `silence_window` elapses with no new
//! audio, at which point it publishes `AudioTurnClosed{duration_ms}` so
//! `Stt` downstream knows the turn boundary without needing its own
//! timing logic.

use async_trait::async_trait;
use tokio::time::{timeout, Duration};

use pk_domain::{ElementPayload, EventKind, Result};

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::time::now_ms;

const DEFAULT_SILENCE_WINDOW_MS: u64 = 1_200;

pub struct AudioTurn {
    silence_window: Duration,
}

impl AudioTurn {
    pub fn new() -> Self {
        Self { silence_window: Duration::from_millis(DEFAULT_SILENCE_WINDOW_MS) }
    }

    pub fn with_silence_window(mut self, silence_window: Duration) -> Self {
        self.silence_window = silence_window;
        self
    }
}

impl Default for AudioTurn {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for AudioTurn {
    fn name(&self) -> &str {
        "audio_turn"
    }

    fn kind(&self) -> StageKind {
        StageKind::Accumulate
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let mut turn_open = false;
        let mut turn_started_at = 0i64;

        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }

            let next = if turn_open {
                match timeout(self.silence_window, input.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        let duration_ms = (now_ms() - turn_started_at).max(0) as u64;
                        ctx.publish(EventKind::AudioTurnClosed { duration_ms });
                        turn_open = false;
                        continue;
                    }
                }
            } else {
                input.recv().await
            };

            let Some(element) = next else {
                if turn_open {
                    let duration_ms = (now_ms() - turn_started_at).max(0) as u64;
                    ctx.publish(EventKind::AudioTurnClosed { duration_ms });
                }
                return Ok(());
            };

            if matches!(element.payload, ElementPayload::AudioChunk { .. }) && !turn_open {
                turn_open = true;
                turn_started_at = now_ms();
                ctx.publish(EventKind::AudioTurnStarted);
            }

            if output.send(element).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pk_domain::{EventKind as EK, StreamElement};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn closes_turn_after_silence_window_elapses() {
        let bus = Arc::new(crate::event_bus::EventBus::new());
        let mut events = bus.subscribe();
        let ctx = StageContext::new("conv-1", Default::default(), bus);
        let stage = AudioTurn::new().with_silence_window(StdDuration::from_millis(30));

        let (input_tx, input_rx) = mpsc::channel(4);
        let (output_tx, mut output_rx) = mpsc::channel(4);

        input_tx
            .send(StreamElement::new(ElementPayload::AudioChunk { data: vec![1, 2, 3], sample_rate_hz: 16_000 }, 0))
            .await
            .unwrap();

        let handle = tokio::spawn(async move { stage.process(&ctx, input_rx, output_tx).await });

        output_rx.recv().await.unwrap();
        drop(input_tx);

        handle.await.unwrap().unwrap();

        let mut saw_started = false;
        let mut saw_closed = false;
        while let Ok(event) = events.try_recv() {
            match event.kind {
                EK::AudioTurnStarted => saw_started = true,
                EK::AudioTurnClosed { .. } => saw_closed = true,
                _ => {}
            }
        }
        assert!(saw_started);
        assert!(saw_closed);
    }
}
