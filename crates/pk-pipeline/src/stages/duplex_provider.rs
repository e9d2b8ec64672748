//! `DuplexSession`/`DuplexProvider` (§4.2): the bidirectional stage for
//! native multimodal providers whose outgoing and incoming audio/text
//! share a single live session, rather than the request/response
//! round-trip `ProviderStage` drives. Two concurrent loops run for the
//! lifetime of the call: one pumps elements from `input` into the
//! session, the other pumps the session's output into `output`. Either
//! side closing ends the stage.

use std::sync::Arc;

use async_trait::async_trait;

use pk_domain::{ElementPayload, Result, StreamElement};

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::time::now_ms;

/// A live bidirectional session with a native multimodal provider.
/// Implementations own the underlying transport (e.g. a websocket); the
/// stage never sees it directly.
#[async_trait]
pub trait DuplexSession: Send + Sync {
    /// Forwards one element's payload into the session.
    async fn send(&self, payload: ElementPayload) -> Result<()>;

    /// Waits for the session's next output payload. `Ok(None)` signals
    /// the session closed from the provider side.
    async fn recv(&self) -> Result<Option<ElementPayload>>;

    /// Releases the session. Default no-op for sessions with nothing to
    /// tear down explicitly.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct DuplexProvider {
    session: Arc<dyn DuplexSession>,
}

impl DuplexProvider {
    pub fn new(session: Arc<dyn DuplexSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Stage for DuplexProvider {
    fn name(&self) -> &str {
        "duplex_provider"
    }

    fn kind(&self) -> StageKind {
        StageKind::Bidirectional
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let cancel = ctx.cancel.clone();

        let send_loop = async {
            while let Some(element) = input.recv().await {
                if cancel.is_cancelled() {
                    break;
                }
                self.session.send(element.payload).await?;
            }
            self.session.close().await
        };

        let recv_loop = async {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    received = self.session.recv() => {
                        match received? {
                            Some(payload) => {
                                if output.send(StreamElement::new(payload, now_ms())).await.is_err() {
                                    return Ok(());
                                }
                            }
                            None => return Ok(()),
                        }
                    }
                }
            }
        };

        let (send_result, recv_result): (Result<()>, Result<()>) = tokio::join!(send_loop, recv_loop);
        send_result?;
        recv_result
    }
}
