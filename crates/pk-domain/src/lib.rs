//! Core types shared across every PromptKit crate: the message and media
//! model, the immutable streaming element that flows between pipeline
//! stages, conversation state, the event bus's event vocabulary, and the
//! ambient configuration/error types the rest of the workspace builds on.

pub mod capability;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod message;
pub mod stream;
pub mod token;

pub use capability::{LlmCapabilities, ModelRole, ToolSupport};
pub use config::{ConversationOptions, ObservabilityConfig, QuerySource, TruncationStrategy};
pub use conversation::{ConversationState, Summary};
pub use error::{Error, HookPhase, Result};
pub use event::{Event, EventKind};
pub use message::{
    ContentPart, MediaContent, MediaKind, MediaLoader, MediaSource, Message, MessageContent, Role,
    StorageReference, ToolCall, ToolDefinition,
};
pub use stream::{BoxStream, Chunk, ElementPayload, Priority, StreamElement, Usage};
pub use token::estimate_tokens;
