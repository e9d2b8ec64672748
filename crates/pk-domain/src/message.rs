use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the conversation (provider-agnostic). §3.2: role, a
/// scalar-or-parts content body, optional tool-call descriptors (set on
/// an assistant message that invoked tools), and an optional tool-call
/// correlation id (set on the tool-role message answering one of them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    /// Audio/video/image content addressed by exactly one source kind.
    /// Large payloads are expected to live behind a `Stored` reference
    /// rather than inline bytes; the pipeline externalizes anything past
    /// the configured media-storage threshold before it reaches a part.
    #[serde(rename = "media")]
    Media { media: MediaContent },
}

/// Kind of media a [`MediaContent`] part carries. Informational only;
/// loading is source-driven, not kind-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

/// A media part's payload source. Exactly one variant is ever populated;
/// this is modeled as an enum (rather than three `Option` fields) precisely
/// so the exactly-one-source invariant is enforced by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MediaSource {
    /// Bytes already resident in the element, base64-encoded on the wire.
    Inline {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    /// A path on a filesystem the pipeline's `MediaLoader` can reach.
    LocalPath { path: String },
    /// A remote URL the pipeline's `MediaLoader` can fetch.
    Url { url: String },
    /// An opaque handle into externalized media storage (e.g. the
    /// threshold-triggered offload described in the media_storage config).
    Stored(StorageReference),
}

/// Handle returned by the media store when a part's payload is
/// externalized. Opaque outside the store that issued it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageReference {
    pub key: String,
    pub byte_len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaContent {
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub source: MediaSource,
}

impl MediaContent {
    pub fn inline(kind: MediaKind, bytes: Vec<u8>, content_type: impl Into<Option<String>>) -> Self {
        Self {
            kind,
            content_type: content_type.into(),
            source: MediaSource::Inline { bytes },
        }
    }

    pub fn stored(kind: MediaKind, reference: StorageReference) -> Self {
        let content_type = reference.content_type.clone();
        Self {
            kind,
            content_type,
            source: MediaSource::Stored(reference),
        }
    }
}

/// Resolves any [`MediaSource`] to its bytes on demand. Stages that need
/// raw media data (STT transcription, externalization past the storage
/// threshold) depend on this trait rather than reaching into a concrete
/// store, mirroring how the conversation-state store is injected rather
/// than looked up globally.
#[async_trait]
pub trait MediaLoader: Send + Sync {
    async fn load(&self, source: &MediaSource) -> Result<Vec<u8>>;
}

pub(crate) mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// An assistant message whose turn produced tool calls instead of (or
    /// alongside) text content.
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        let tool_use_id = tool_use_id.into();
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: content.into(),
                is_error: false,
            }]),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_use_id),
        }
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text part, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Extract and join all text content, returning an owned String.
    ///
    /// For `Text` variant, returns the string directly.
    /// For `Parts` variant, joins all `Text` parts with `"\n"`.
    /// Non-text parts (ToolUse, ToolResult, Image) are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_text_variant() {
        let content = MessageContent::Text("hello world".into());
        assert_eq!(content.extract_all_text(), "hello world");
    }

    #[test]
    fn extract_all_text_from_parts_joins_with_newline() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "line one".into() },
            ContentPart::ToolUse {
                id: "c1".into(),
                name: "exec".into(),
                input: serde_json::json!({}),
            },
            ContentPart::Text { text: "line two".into() },
        ]);
        assert_eq!(content.extract_all_text(), "line one\nline two");
    }

    #[test]
    fn extract_all_text_empty_parts() {
        let content = MessageContent::Parts(vec![]);
        assert_eq!(content.extract_all_text(), "");
    }

    #[test]
    fn extract_all_text_skips_media_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "caption".into() },
            ContentPart::Media {
                media: MediaContent::inline(MediaKind::Image, vec![1, 2, 3], "image/png".to_string()),
            },
        ]);
        assert_eq!(content.extract_all_text(), "caption");
    }

    #[test]
    fn media_inline_roundtrips_through_json() {
        let media = MediaContent::inline(MediaKind::Audio, vec![0, 1, 2, 255], None);
        let json = serde_json::to_value(&media).unwrap();
        let back: MediaContent = serde_json::from_value(json).unwrap();
        match back.source {
            MediaSource::Inline { bytes } => assert_eq!(bytes, vec![0, 1, 2, 255]),
            other => panic!("expected inline source, got {other:?}"),
        }
    }

    #[test]
    fn media_stored_reference_carries_byte_len() {
        let reference = StorageReference {
            key: "media/abc123".into(),
            byte_len: 204_800,
            content_type: Some("video/mp4".into()),
        };
        let media = MediaContent::stored(MediaKind::Video, reference);
        assert_eq!(media.content_type.as_deref(), Some("video/mp4"));
        match media.source {
            MediaSource::Stored(r) => assert_eq!(r.byte_len, 204_800),
            other => panic!("expected stored source, got {other:?}"),
        }
    }
}
