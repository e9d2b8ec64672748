//! A deterministic provider for tests, scenario fixtures, and examples.
//!
//! [`MockProvider`] plays back pre-configured chunk scripts in order,
//! cycling back to the start once exhausted, the same pattern used by
//! canned test backends elsewhere in the corpus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;
use pk_domain::{BoxStream, Chunk, LlmCapabilities, Result, Usage};

use crate::traits::{ChatRequest, ChatResponse, Provider};

/// One scripted turn: the ordered chunks a streaming call emits, and the
/// full text those chunks join into for a non-streaming `complete` call.
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pub chunks: Vec<String>,
}

impl ScriptedTurn {
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            chunks: vec![text.into()],
        }
    }

    fn full_text(&self) -> String {
        self.chunks.concat()
    }
}

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    turns: Vec<ScriptedTurn>,
    index: AtomicUsize,
    /// Tool calls to emit on specific turn indices (0-based), if any.
    tool_calls: Mutex<std::collections::HashMap<usize, Vec<pk_domain::ToolCall>>>,
    capabilities: LlmCapabilities,
}

impl MockProvider {
    /// A mock whose every call returns `response`, unsplit (one chunk).
    pub fn fixed(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self::new(name, vec![ScriptedTurn::single(response.into())])
    }

    /// A mock that cycles through `turns` in order, one per call.
    pub fn new(name: impl Into<String>, turns: Vec<ScriptedTurn>) -> Self {
        assert!(!turns.is_empty(), "MockProvider requires at least one scripted turn");
        Self {
            name: name.into(),
            turns,
            index: AtomicUsize::new(0),
            tool_calls: Mutex::new(std::collections::HashMap::new()),
            capabilities: LlmCapabilities {
                supports_tools: pk_domain::ToolSupport::Basic,
                supports_streaming: true,
                supports_json_mode: false,
                supports_vision: false,
                context_window_tokens: None,
                max_output_tokens: None,
            },
        }
    }

    /// Make the `turn_index`-th call (0-based) also emit `tool_calls`.
    pub fn with_tool_call_on_turn(self, turn_index: usize, tool_calls: Vec<pk_domain::ToolCall>) -> Self {
        self.tool_calls.lock().unwrap().insert(turn_index, tool_calls);
        self
    }

    fn next_turn_index(&self) -> usize {
        self.index.fetch_add(1, Ordering::Relaxed) % self.turns.len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse> {
        let idx = self.next_turn_index();
        let turn = &self.turns[idx];
        let tool_calls = self
            .tool_calls
            .lock()
            .unwrap()
            .get(&idx)
            .cloned()
            .unwrap_or_default();
        Ok(ChatResponse {
            content: turn.full_text(),
            tool_calls,
            usage: Some(Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            }),
            model: self.name.clone(),
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn complete_stream(&self, _request: ChatRequest) -> Result<BoxStream<'static, Chunk>> {
        let idx = self.next_turn_index();
        let turn = self.turns[idx].clone();
        let tool_calls = self
            .tool_calls
            .lock()
            .unwrap()
            .get(&idx)
            .cloned()
            .unwrap_or_default();

        let mut items: Vec<Chunk> = turn
            .chunks
            .into_iter()
            .map(|text| Chunk::Token { text })
            .collect();
        for call in tool_calls {
            items.push(Chunk::ToolCallStarted {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
            });
            items.push(Chunk::ToolCallFinished {
                call_id: call.call_id,
                tool_name: call.tool_name,
                arguments: call.arguments,
            });
        }
        items.push(Chunk::Done {
            usage: Some(Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            }),
            finish_reason: Some("stop".to_string()),
        });

        Ok(Box::pin(stream::iter(items)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn fixed_provider_returns_same_response_every_call() {
        let mock = MockProvider::fixed("mock", "hello");
        let r1 = mock.complete(ChatRequest::default()).await.unwrap();
        let r2 = mock.complete(ChatRequest::default()).await.unwrap();
        assert_eq!(r1.content, "hello");
        assert_eq!(r2.content, "hello");
    }

    #[tokio::test]
    async fn scripted_turns_cycle_in_order() {
        let mock = MockProvider::new(
            "mock",
            vec![ScriptedTurn::single("first"), ScriptedTurn::single("second")],
        );
        let r1 = mock.complete(ChatRequest::default()).await.unwrap();
        let r2 = mock.complete(ChatRequest::default()).await.unwrap();
        let r3 = mock.complete(ChatRequest::default()).await.unwrap();
        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
        assert_eq!(r3.content, "first");
    }

    #[tokio::test]
    async fn streaming_emits_scripted_chunks_then_done() {
        let mock = MockProvider::new(
            "mock",
            vec![ScriptedTurn {
                chunks: vec!["safe ".into(), "forbidden".into(), "tail".into()],
            }],
        );
        let mut stream = mock.complete_stream(ChatRequest::default()).await.unwrap();
        let mut texts = Vec::new();
        while let Some(chunk) = stream.next().await {
            if let Chunk::Token { text } = chunk {
                texts.push(text);
            }
        }
        assert_eq!(texts, vec!["safe ", "forbidden", "tail"]);
    }
}
