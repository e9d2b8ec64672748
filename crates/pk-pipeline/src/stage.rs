//! The `Stage` contract (§4.1): a polymorphic DAG node with a stable
//! name, a kind tag, and a single `process` operation reading from one
//! channel and writing to another.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pk_domain::{EventKind, Result, StreamElement};

use crate::event_bus::EventBus;

/// Default per-edge channel buffer (§4.1: "default small, e.g. 16") — the
/// sole backpressure mechanism between stages.
pub const DEFAULT_BUFFER_SIZE: usize = 16;

pub type ElementReceiver = mpsc::Receiver<StreamElement>;
pub type ElementSender = mpsc::Sender<StreamElement>;

/// What kind of work a stage performs. Informational — the runtime
/// dispatches on the `Stage` trait alone, never on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Transform,
    Accumulate,
    Generate,
    Sink,
    Observe,
    Bidirectional,
}

/// Per-run context handed to every stage invocation.
#[derive(Clone)]
pub struct StageContext {
    pub conversation_id: String,
    pub cancel: CancellationToken,
    pub events: Arc<EventBus>,
}

impl StageContext {
    pub fn new(conversation_id: impl Into<String>, cancel: CancellationToken, events: Arc<EventBus>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            cancel,
            events,
        }
    }

    pub fn publish(&self, kind: EventKind) {
        self.events.publish(&self.conversation_id, kind);
    }
}

/// A single node in the pipeline DAG. Implementations read `input` until
/// it closes, send derived elements to `output`, and let `output` drop
/// when `process` returns so downstream stages observe end-of-stream.
/// On `ctx.cancel` firing, a stage must finish its current element (no
/// partial emission) and return promptly rather than keep consuming
/// `input`. A stage must never retain a reference to an element after
/// forwarding it — elements are immutable and owned exactly once per hop.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> StageKind;

    async fn process(&self, ctx: &StageContext, input: ElementReceiver, output: ElementSender) -> Result<()>;
}
