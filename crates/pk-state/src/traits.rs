use async_trait::async_trait;
use pk_domain::{ConversationState, Message, Result, Summary};

/// Base Conversation State Store contract (§4.3). Every backend
/// implements this; the optional extensions below are detected by the
/// pipeline at conversation-open time via the `as_*` opt-in methods
/// rather than a runtime capability probe — Rust has no safe
/// equivalent of a duck-typed interface test, so a backend that
/// supports an extension overrides the corresponding `as_*` method to
/// return `Some(self)`.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<ConversationState>;

    /// Atomic replace. `expected_version: Some(v)` requests the
    /// optimistic-lock variant: the store must fail with
    /// `Error::VersionMismatch` if the record on file is not at
    /// version `v`.
    async fn save(&self, state: &ConversationState, expected_version: Option<u64>) -> Result<()>;

    /// Deep-copies `source_id`'s messages/summaries into a new record
    /// at `new_id`. Fails if `new_id` already exists.
    async fn fork(&self, source_id: &str, new_id: &str) -> Result<()>;

    fn as_message_reader(&self) -> Option<&dyn MessageReader> {
        None
    }

    fn as_message_appender(&self) -> Option<&dyn MessageAppender> {
        None
    }

    fn as_summary_accessor(&self) -> Option<&dyn SummaryAccessor> {
        None
    }
}

/// O(1) tail-read extension. A pipeline's `StateLoad` stage prefers
/// this over `load` + in-memory slicing when a backend supports it.
#[async_trait]
pub trait MessageReader: Send + Sync {
    async fn load_recent_messages(&self, id: &str, n: usize) -> Result<Vec<Message>>;
    async fn message_count(&self, id: &str) -> Result<usize>;
}

/// Append-without-load-modify-save extension, required to be atomic
/// (list-push semantics) by backends that implement it.
#[async_trait]
pub trait MessageAppender: Send + Sync {
    async fn append_messages(&self, id: &str, messages: &[Message]) -> Result<()>;
}

/// Independent summary storage, decoupled from the full-state
/// load/save round trip.
#[async_trait]
pub trait SummaryAccessor: Send + Sync {
    async fn load_summaries(&self, id: &str) -> Result<Vec<Summary>>;
    async fn save_summary(&self, id: &str, summary: Summary) -> Result<()>;
}
