//! Agent-UI streaming bridge contract (§6.4). Consumes a `RunAgentInput`
//! and is expected to emit an ordered SSE stream of the typed events
//! below; the actual SSE transport is out of scope (a protocol server
//! that's explicitly an external collaborator, §1). [`map_event`] is the
//! fixed mapping table from the core's own event bus (`pk_domain::Event`)
//! to this vocabulary.

use serde::{Deserialize, Serialize};

use pk_domain::{Event, EventKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAgentInput {
    pub thread_id: String,
    pub run_id: String,
    pub messages: Vec<pk_domain::Message>,
    #[serde(default)]
    pub tools: Vec<pk_domain::ToolDefinition>,
    #[serde(default)]
    pub context: Vec<serde_json::Value>,
}

/// The ordered SSE event vocabulary AG-UI consumers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgUiEvent {
    #[serde(rename = "RUN_STARTED")]
    RunStarted { thread_id: String, run_id: String },
    #[serde(rename = "RUN_FINISHED")]
    RunFinished { thread_id: String, run_id: String },
    #[serde(rename = "RUN_ERROR")]
    RunError { message: String },

    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart { message_id: String, role: String },
    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent { message_id: String, delta: String },
    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd { message_id: String },

    #[serde(rename = "TOOL_CALL_START")]
    ToolCallStart { tool_call_id: String, tool_name: String },
    #[serde(rename = "TOOL_CALL_ARGS")]
    ToolCallArgs { tool_call_id: String, delta: String },
    #[serde(rename = "TOOL_CALL_END")]
    ToolCallEnd { tool_call_id: String },
    #[serde(rename = "TOOL_CALL_RESULT")]
    ToolCallResult { tool_call_id: String, content: String },

    #[serde(rename = "STATE_SNAPSHOT")]
    StateSnapshot { snapshot: serde_json::Value },
    #[serde(rename = "STATE_DELTA")]
    StateDelta { delta: serde_json::Value },

    #[serde(rename = "STEP_STARTED")]
    StepStarted { step_name: String },
    #[serde(rename = "STEP_FINISHED")]
    StepFinished { step_name: String },
}

/// Maps one core event to its AG-UI counterpart. This is a fixed table,
/// not a general translator: events with no AG-UI counterpart (e.g.
/// `AudioTurnStarted`) map to `None` and are simply not forwarded to an
/// AG-UI consumer.
pub fn map_event(event: &Event) -> Option<AgUiEvent> {
    match &event.kind {
        EventKind::PipelineStarted => Some(AgUiEvent::RunStarted {
            thread_id: event.conversation_id.clone(),
            run_id: event.conversation_id.clone(),
        }),
        EventKind::PipelineCompleted => Some(AgUiEvent::RunFinished {
            thread_id: event.conversation_id.clone(),
            run_id: event.conversation_id.clone(),
        }),
        EventKind::PipelineFailed { reason } => Some(AgUiEvent::RunError {
            message: reason.clone(),
        }),
        EventKind::StageStarted { stage } => Some(AgUiEvent::StepStarted {
            step_name: stage.clone(),
        }),
        EventKind::StageCompleted { stage } => Some(AgUiEvent::StepFinished {
            step_name: stage.clone(),
        }),
        EventKind::StageFailed { stage, reason } => Some(AgUiEvent::RunError {
            message: format!("stage '{stage}' failed: {reason}"),
        }),
        EventKind::ToolCallStarted { call_id, tool_name } => Some(AgUiEvent::ToolCallStart {
            tool_call_id: call_id.clone(),
            tool_name: tool_name.clone(),
        }),
        EventKind::ToolCallCompleted { call_id, .. } => Some(AgUiEvent::ToolCallEnd {
            tool_call_id: call_id.clone(),
        }),
        EventKind::ToolCallFailed { call_id, tool_name, reason } => Some(AgUiEvent::ToolCallResult {
            tool_call_id: call_id.clone(),
            content: format!("{tool_name} failed: {reason}"),
        }),
        EventKind::MessageCreated { role } => Some(AgUiEvent::TextMessageStart {
            message_id: event.conversation_id.clone(),
            role: role.clone(),
        }),
        _ => None,
    }
}
