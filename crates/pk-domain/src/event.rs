use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event published on the event bus. `conversation_id` is always
/// present so subscribers filtering by conversation never need to parse
/// `kind` first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub conversation_id: String,
    pub created_at_ms: u64,
    pub kind: EventKind,
}

/// The minimum event set every pipeline runtime publishes. Stage authors
/// never publish `pipeline.*`/`stage.*` events themselves — the runtime
/// emits those automatically around every stage invocation; everything
/// else is published by the stage (or hook) that observed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    PipelineStarted,
    PipelineCompleted,
    PipelineFailed { reason: String },

    StageStarted { stage: String },
    StageCompleted { stage: String },
    StageFailed { stage: String, reason: String },

    ProviderCallStarted { provider: String, model: Option<String> },
    ProviderCallCompleted {
        provider: String,
        model: Option<String>,
        latency_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        cost_usd: Option<f64>,
    },
    ProviderCallFailed { provider: String, reason: String },

    ToolCallStarted { call_id: String, tool_name: String },
    ToolCallCompleted { call_id: String, tool_name: String, latency_ms: u64 },
    ToolCallFailed { call_id: String, tool_name: String, reason: String },

    ValidationFailed { hook_name: String, phase: String, reason: String },

    MessageCreated { role: String },

    AudioTurnStarted,
    AudioTurnClosed { duration_ms: u64 },
    SttCompleted { text_len: usize },
    TtsStarted,
    TtsInterrupted,

    /// Escape hatch for stage- or hook-specific events not named above.
    /// Keeps the enum from having to anticipate every extension module's
    /// telemetry needs up front.
    Custom {
        name: String,
        #[serde(default)]
        data: HashMap<String, serde_json::Value>,
    },
}

impl Event {
    pub fn new(conversation_id: impl Into<String>, created_at_ms: u64, kind: EventKind) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            created_at_ms,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failed_roundtrips_with_reason() {
        let event = Event::new(
            "conv-1",
            0,
            EventKind::StageFailed {
                stage: "provider".into(),
                reason: "timeout".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        let back: Event = serde_json::from_value(json).unwrap();
        match back.kind {
            EventKind::StageFailed { stage, reason } => {
                assert_eq!(stage, "provider");
                assert_eq!(reason, "timeout");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn custom_event_carries_arbitrary_data() {
        let mut data = HashMap::new();
        data.insert("vad_silence_ms".to_string(), serde_json::json!(1200));
        let event = Event::new(
            "conv-1",
            0,
            EventKind::Custom {
                name: "vad.window_closed".into(),
                data,
            },
        );
        assert!(matches!(event.kind, EventKind::Custom { .. }));
    }
}
