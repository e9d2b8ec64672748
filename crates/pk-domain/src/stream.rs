use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

use crate::message::{ContentPart, Message};

/// A boxed async stream, used for provider streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// A single increment of a provider's streaming response.
///
/// This is the wire-level unit the Provider Stage consumes from a
/// `Provider::complete_stream` call, before it is folded into the
/// `StreamElement`s that actually cross stage boundaries on the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Chunk {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A tool call has started.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    /// Incremental tool call argument data.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// A tool call is complete with full arguments.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Scheduling hint carried by an element. Stages that fan in from several
/// upstreams (e.g. a duplex audio/text join) may use this to prioritize;
/// the core scheduler itself does not reorder on priority, it only ever
/// preserves per-channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// The exactly-one payload a [`StreamElement`] carries. Modeled as an enum
/// (not a struct of `Option` fields) so "at most one payload field set" is
/// an invariant of the type rather than something callers must maintain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementPayload {
    Text(String),
    AudioChunk {
        #[serde(with = "crate::message::base64_bytes")]
        data: Vec<u8>,
        sample_rate_hz: u32,
    },
    VideoChunk {
        #[serde(with = "crate::message::base64_bytes")]
        data: Vec<u8>,
    },
    Image {
        #[serde(with = "crate::message::base64_bytes")]
        data: Vec<u8>,
        content_type: Option<String>,
    },
    StructuredMessage(Message),
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    Parts(Vec<ContentPart>),
    Error {
        message: String,
    },
}

/// The immutable unit of data flow between pipeline stages.
///
/// Once constructed, a `StreamElement` is never mutated in place; a stage
/// that wants to transform an element produces a new one and sends it
/// downstream. This is what lets stages run as independent concurrent
/// workers without a shared-state synchronization story beyond the
/// channels connecting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamElement {
    pub payload: ElementPayload,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub priority: Priority,
    /// Milliseconds since the Unix epoch. Stamped once at creation and
    /// never revised as the element moves downstream.
    pub created_at_ms: u64,
}

impl StreamElement {
    pub fn new(payload: ElementPayload, created_at_ms: u64) -> Self {
        Self {
            payload,
            metadata: HashMap::new(),
            priority: Priority::default(),
            created_at_ms,
        }
    }

    pub fn text(text: impl Into<String>, created_at_ms: u64) -> Self {
        Self::new(ElementPayload::Text(text.into()), created_at_ms)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The plain text this element carries, if its payload is text-shaped.
    /// `Parts` elements return the joined text of their `Text` sub-parts.
    pub fn as_text(&self) -> Option<String> {
        match &self.payload {
            ElementPayload::Text(t) => Some(t.clone()),
            ElementPayload::Parts(parts) => {
                let joined = parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                if joined.is_empty() {
                    None
                } else {
                    Some(joined)
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_element_roundtrips_through_json() {
        let element = StreamElement::text("hello", 1_000).with_priority(Priority::High);
        let json = serde_json::to_value(&element).unwrap();
        let back: StreamElement = serde_json::from_value(json).unwrap();
        assert_eq!(back.as_text().as_deref(), Some("hello"));
        assert_eq!(back.priority, Priority::High);
    }

    #[test]
    fn default_priority_is_normal() {
        let element = StreamElement::text("x", 0);
        assert_eq!(element.priority, Priority::Normal);
    }

    #[test]
    fn parts_payload_joins_text_subparts_only() {
        let element = StreamElement::new(
            ElementPayload::Parts(vec![
                ContentPart::Text { text: "a".into() },
                ContentPart::ToolUse {
                    id: "1".into(),
                    name: "x".into(),
                    input: serde_json::json!({}),
                },
                ContentPart::Text { text: "b".into() },
            ]),
            0,
        );
        assert_eq!(element.as_text().as_deref(), Some("a\nb"));
    }

    #[test]
    fn non_text_payload_has_no_text_projection() {
        let element = StreamElement::new(
            ElementPayload::ToolCall {
                call_id: "c1".into(),
                tool_name: "get_time".into(),
                arguments: serde_json::json!({}),
            },
            0,
        );
        assert_eq!(element.as_text(), None);
    }
}
