//! The Hook Registry (§4.4): ordered interceptors around provider calls,
//! streaming chunks, tool dispatch, and session lifecycle, plus the
//! built-in guardrails (banned words, length limits, max sentences,
//! required fields) and the pack-to-hook factory that reifies a pack's
//! declared validators into guardrail hooks at conversation-open.

pub mod decision;
pub mod factory;
pub mod guardrails;
pub mod registry;
pub mod traits;

pub use decision::Decision;
pub use factory::{build_guardrail, ValidatorSpec};
pub use guardrails::{BannedWordsHook, LengthLimitHook, MaxSentencesHook, RequiredFieldsHook};
pub use registry::HookRegistry;
pub use traits::{ChunkInterceptor, ProviderHook, SessionHook, ToolHook};
