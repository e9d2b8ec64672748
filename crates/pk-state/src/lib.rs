//! The Conversation State Store (§4.3): `Load`/`Save`/`Fork` plus the
//! optional `MessageReader`/`MessageAppender`/`SummaryAccessor`
//! extensions pipeline stages prefer when a backend supports them. Two
//! required backends: an in-process mutex-guarded map for local use and
//! tests, and a Redis-backed distributed store for multi-process
//! deployments.

pub mod memory;
pub mod redis_store;
pub mod traits;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;
pub use traits::{ConversationStore, MessageAppender, MessageReader, SummaryAccessor};
