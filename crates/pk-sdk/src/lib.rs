//! Public `Conversation` API (§2, §9, GLOSSARY): the façade that ties
//! the pipeline runtime, conversation state store, hook registry, and
//! pack together into the one handle an embedding application opens,
//! sends turns through, forks, and closes.

pub mod builder;
pub mod conversation;
pub mod stream;

pub use builder::ConversationBuilder;
pub use conversation::Conversation;
pub use stream::ConversationStream;
