//! End-to-end turn scenarios against the public `Conversation` API: a
//! text turn, a banned-words streaming abort, a tool round, sliding
//! token-budget truncation, fork isolation, and VAD turn accumulation.
//!
//! Exercises `pk_sdk::ConversationBuilder`/`Conversation` against
//! `MockProvider`, `InMemoryStore`, and literal `Pack` fixtures, rather
//! than any real provider or backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use pk_domain::{
    ConversationOptions, ConversationState, ElementPayload, EventKind, Message, Role, ToolCall, ToolDefinition,
};
use pk_pack::Pack;
use pk_pipeline::stages::{AudioTurn, MockSpeechToText, Stt};
use pk_pipeline::{Stage, StageContext};
use pk_providers::mock::{MockProvider, ScriptedTurn};
use pk_sdk::ConversationBuilder;
use pk_state::{ConversationStore, InMemoryStore};
use pk_tools::{ToolHandler, ToolOutcome, ToolRegistry};

fn chat_pack(validators_json: &str) -> Arc<Pack> {
    let json = format!(
        r#"{{
            "tools": {{}},
            "prompts": {{
                "chat": {{"system_template": "You are helpful.", "allowed_tools": [], "validators": {validators_json}}}
            }}
        }}"#
    );
    Arc::new(Pack::from_json_str(&json).unwrap())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 1: single-turn text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_turn_text_persists_system_user_assistant_and_completes() {
    let pack = chat_pack("[]");
    let provider = Arc::new(MockProvider::fixed("mock", "hello"));
    let store = Arc::new(InMemoryStore::new());

    let conversation = ConversationBuilder::new(pk_pipeline::Mode::Text)
        .provider(provider)
        .store(store.clone())
        .pack(pack, "chat")
        .build("conv-1")
        .await
        .unwrap();

    let mut events = conversation.events().subscribe();

    let elements = conversation.send_text("hi").await.unwrap().collect().await;
    assert!(elements.iter().any(|e| matches!(&e.payload, ElementPayload::Text(t) if t == "hello")));

    let state = store.load("conv-1").await.unwrap();
    assert_eq!(state.messages.len(), 3);
    assert_eq!(state.messages[0].role, Role::System);
    assert_eq!(state.messages[0].content.text(), Some("You are helpful."));
    assert_eq!(state.messages[1].role, Role::User);
    assert_eq!(state.messages[1].content.text(), Some("hi"));
    assert_eq!(state.messages[2].role, Role::Assistant);
    assert_eq!(state.messages[2].content.text(), Some("hello"));

    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event.kind, EventKind::PipelineCompleted) {
            saw_completed = true;
        }
    }
    assert!(saw_completed, "expected exactly one pipeline.completed event");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 2: banned-words streaming abort
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn banned_word_mid_stream_aborts_after_second_chunk() {
    let pack = chat_pack(r#"[{"type": "banned_words", "params": {"words": ["forbidden"]}}]"#);
    let provider = Arc::new(MockProvider::new(
        "mock",
        vec![ScriptedTurn {
            chunks: vec!["safe ".into(), "forbidden".into(), "tail".into()],
        }],
    ));
    let store = Arc::new(InMemoryStore::new());

    let conversation = ConversationBuilder::new(pk_pipeline::Mode::Text)
        .provider(provider)
        .store(store)
        .pack(pack, "chat")
        .build("conv-1")
        .await
        .unwrap();

    let elements = conversation.send_text("hi").await.unwrap().collect().await;

    let texts: Vec<String> = elements
        .iter()
        .filter_map(|e| match &e.payload {
            ElementPayload::Text(t) => Some(t.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["safe ".to_string()]);
    assert!(!texts.iter().any(|t| t.contains("tail")), "third chunk must never reach the caller");

    let errors: Vec<&String> = elements
        .iter()
        .filter_map(|e| match &e.payload {
            ElementPayload::Error { message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1, "exactly one terminal error element");
    assert!(errors[0].contains("banned_words"));
    assert!(errors[0].contains("chunk"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 3: tool round
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct GetTimeTool;

#[async_trait::async_trait]
impl ToolHandler for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }
    async fn execute(&self, _arguments: serde_json::Value) -> pk_domain::Result<ToolOutcome> {
        Ok(ToolOutcome::Completed("12:00Z".into()))
    }
}

#[tokio::test]
async fn tool_round_dispatches_then_returns_final_text() {
    let pack = Arc::new(
        Pack::from_json_str(
            r#"{
                "tools": {"get_time": {"description": "current time", "parameters": {"type": "object", "properties": {"timezone": {"type": "string"}}}}},
                "prompts": {
                    "chat": {"system_template": "You are helpful.", "allowed_tools": ["get_time"], "validators": []}
                }
            }"#,
        )
        .unwrap(),
    );

    let provider = Arc::new(
        MockProvider::new(
            "mock",
            vec![ScriptedTurn::single("checking"), ScriptedTurn::single("It is 12:00Z.")],
        )
        .with_tool_call_on_turn(
            0,
            vec![ToolCall {
                call_id: "call-1".into(),
                tool_name: "get_time".into(),
                arguments: json!({"timezone": "UTC"}),
            }],
        ),
    );

    let mut tools = ToolRegistry::new();
    tools.register(
        ToolDefinition {
            name: "get_time".into(),
            description: "current time".into(),
            parameters: json!({"type": "object"}),
        },
        Arc::new(GetTimeTool),
    );

    let conversation = ConversationBuilder::new(pk_pipeline::Mode::Text)
        .provider(provider)
        .pack(pack, "chat")
        .tools(Arc::new(tools))
        .build("conv-1")
        .await
        .unwrap();

    let mut events = conversation.events().subscribe();

    let elements = conversation.send_text("what time in UTC").await.unwrap().collect().await;
    let final_message = elements.iter().rev().find_map(|e| match &e.payload {
        ElementPayload::StructuredMessage(m) if m.role == Role::Assistant && m.tool_calls.is_empty() => Some(m.clone()),
        _ => None,
    });
    assert_eq!(final_message.unwrap().content.text(), Some("It is 12:00Z."));

    let mut started = None;
    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        match event.kind {
            EventKind::ToolCallStarted { call_id, .. } if started.is_none() => started = Some(call_id),
            EventKind::ToolCallCompleted { call_id, .. } if completed.is_none() => completed = Some(call_id),
            _ => {}
        }
    }
    assert_eq!(started.as_deref(), Some("call-1"));
    assert_eq!(completed.as_deref(), Some("call-1"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 4: token-budget sliding truncation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn token_budget_truncates_assembled_context_not_persisted_history() {
    let pack = chat_pack("[]");
    let provider = Arc::new(MockProvider::fixed("mock", "ack"));
    let store = Arc::new(InMemoryStore::new());

    // 10 messages, ~900 tokens (3600 chars) each, ~9000 tokens total.
    let mut state = ConversationState::new("conv-1");
    for i in 0..10 {
        let text = "x".repeat(3600);
        state.messages.push(if i % 2 == 0 { Message::user(text) } else { Message::assistant(text) });
    }
    store.save(&state, None).await.unwrap();

    let options = ConversationOptions { token_budget: Some(4000), ..ConversationOptions::default() };

    let conversation = ConversationBuilder::new(pk_pipeline::Mode::Text)
        .provider(provider)
        .store(store.clone())
        .pack(pack, "chat")
        .options(options)
        .build("conv-1")
        .await
        .unwrap();

    let mut events = conversation.events().subscribe();
    let _ = conversation.send_text("what's the status?").await.unwrap().collect().await;

    let mut report = None;
    while let Ok(event) = events.try_recv() {
        if let EventKind::Custom { name, data } = event.kind {
            if name == "context_assembly.report" {
                report = Some(data);
            }
        }
    }
    let report = report.expect("context_assembly should publish its report");
    assert_eq!(report.get("truncated").and_then(|v| v.as_bool()), Some(true));
    let kept = report.get("kept_messages").and_then(|v| v.as_u64()).unwrap();
    assert!(kept > 0 && kept < 11, "kept the most recent tail, not the whole history: {kept}");

    // The persisted history itself is untouched by assembly-time truncation;
    // only the request built for this turn was trimmed.
    let persisted = store.load("conv-1").await.unwrap();
    assert!(persisted.messages.len() >= 10);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 5: fork isolation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn fork_isolates_subsequent_appends_between_conversations() {
    let pack = chat_pack("[]");
    let provider = Arc::new(MockProvider::fixed("mock", "ack"));
    let store = Arc::new(InMemoryStore::new());

    store
        .as_message_appender()
        .unwrap()
        .append_messages("A", &[Message::user("m1"), Message::assistant("m2")])
        .await
        .unwrap();

    let conversation_a = ConversationBuilder::new(pk_pipeline::Mode::Text)
        .provider(provider)
        .store(store.clone())
        .pack(pack, "chat")
        .build("A")
        .await
        .unwrap();

    let _conversation_b = conversation_a.fork("B").await.unwrap();

    store.as_message_appender().unwrap().append_messages("A", &[Message::user("m3")]).await.unwrap();
    store.as_message_appender().unwrap().append_messages("B", &[Message::user("m4")]).await.unwrap();

    let a = store.load("A").await.unwrap();
    let b = store.load("B").await.unwrap();
    assert_eq!(a.messages.len(), 3);
    assert_eq!(a.messages[2].content.text(), Some("m3"));
    assert_eq!(b.messages.len(), 3);
    assert_eq!(b.messages[2].content.text(), Some("m4"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 6: VAD turn accumulation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Drives the mode's own `AudioTurn` → `Stt` chain directly rather than
// through `Conversation::send`, which hands the pipeline a pre-built
// batch with no way to space chunks out in real time; the silence-window
// behavior under test lives entirely inside these two stages.

#[tokio::test]
async fn silence_window_closes_turn_and_accumulates_exactly_one_element() {
    let bus = Arc::new(pk_pipeline::EventBus::new());
    let audio_turn = AudioTurn::new().with_silence_window(Duration::from_millis(80));
    let stt = Stt::new(Arc::new(MockSpeechToText::new()));

    let ctx = StageContext::new("conv-1", Default::default(), bus);
    let (turn_tx, turn_rx) = tokio::sync::mpsc::channel(16);
    let (stt_in_tx, stt_in_rx) = tokio::sync::mpsc::channel(16);
    let (stt_out_tx, mut stt_out_rx) = tokio::sync::mpsc::channel(16);

    let turn_ctx = ctx.clone();
    let turn_handle = tokio::spawn(async move { audio_turn.process(&turn_ctx, turn_rx, stt_in_tx).await });
    let stt_handle = tokio::spawn(async move { stt.process(&ctx, stt_in_rx, stt_out_tx).await });

    // Continuous above-threshold audio, each chunk well inside the
    // silence window so the turn never closes mid-stream.
    let chunk = vec![b'a'; 160];
    let mut total_bytes = 0usize;
    for _ in 0..20 {
        turn_tx
            .send(pk_domain::StreamElement::new(
                pk_domain::ElementPayload::AudioChunk { data: chunk.clone(), sample_rate_hz: 16_000 },
                0,
            ))
            .await
            .unwrap();
        total_bytes += chunk.len();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Sub-threshold silence past the 80ms window; no further chunks arrive.
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(turn_tx);

    turn_handle.await.unwrap().unwrap();
    stt_handle.await.unwrap().unwrap();

    let transcribed = stt_out_rx.recv().await.unwrap();
    let text = transcribed.as_text().unwrap();
    assert_eq!(text.len(), total_bytes + 19, "joined with a space per MockSpeechToText::transcribe");
    assert!(stt_out_rx.recv().await.is_none(), "exactly one accumulated element");
}
