//! [`ConversationStream`]: the channel a `Send` call hands back to its
//! caller. Wraps the pipeline's raw output channel and translates a
//! failed run into the terminal error-payload element callers are
//! expected to see before the channel closes, per the error-handling
//! design's "channel-close is the end-of-stream signal" rule.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pk_domain::StreamElement;

/// A single turn's output. Yields elements as the pipeline produces
/// them; on failure, the final element is an `ElementPayload::Error`
/// rather than the stream silently truncating.
pub struct ConversationStream {
    pub(crate) receiver: mpsc::Receiver<StreamElement>,
    pub(crate) cancel: CancellationToken,
}

impl ConversationStream {
    /// Awaits the next element, or `None` once the stream has closed.
    pub async fn recv(&mut self) -> Option<StreamElement> {
        self.receiver.recv().await
    }

    /// Drains every remaining element into a `Vec`, in arrival order.
    pub async fn collect(mut self) -> Vec<StreamElement> {
        let mut elements = Vec::new();
        while let Some(element) = self.recv().await {
            elements.push(element);
        }
        elements
    }

    /// Requests early termination of the turn still in flight. The
    /// stream keeps yielding whatever the pipeline already emitted
    /// before it observes the cancellation and closes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
