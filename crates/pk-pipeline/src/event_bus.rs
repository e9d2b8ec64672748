//! The event bus (§6.3): published events carry a dotted type, a
//! timestamp, a conversation id, and a typed payload. One bus per
//! conversation; the pipeline runtime publishes `pipeline.*`/`stage.*`
//! automatically, stages and hooks publish everything else.

use pk_domain::{Event, EventKind};
use tokio::sync::broadcast;

use crate::time::now_ms;

const DEFAULT_CAPACITY: usize = 256;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// A subscriber attached after an event was published never sees it —
    /// this is a live side channel, not a durable log.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, conversation_id: &str, kind: EventKind) {
        let _ = self.sender.send(Event::new(conversation_id, now_ms(), kind));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish("conv-1", EventKind::PipelineStarted);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.conversation_id, "conv-1");
        assert!(matches!(event.kind, EventKind::PipelineStarted));
    }

    #[tokio::test]
    async fn subscriber_attached_after_publish_misses_it() {
        let bus = EventBus::new();
        bus.publish("conv-1", EventKind::PipelineStarted);
        let mut rx = bus.subscribe();
        bus.publish("conv-1", EventKind::PipelineCompleted);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::PipelineCompleted));
    }
}
