use async_trait::async_trait;
use pk_domain::{BoxStream, Chunk, LlmCapabilities, Message, Result, ToolDefinition};

/// A provider-agnostic chat completion request. §4.5 Provider contract.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<pk_domain::ToolCall>,
    pub usage: Option<pk_domain::Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// The Provider contract (§4.5). Every adapter — concrete or mock —
/// implements this; `ProviderStage` depends only on this trait object,
/// never on a concrete client.
#[async_trait]
pub trait Provider: Send + Sync {
    /// `Complete(ctx, messages, config) → response, error`.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// `CompleteStream(ctx, messages, config) → stream-channel of Chunk, error`.
    async fn complete_stream(&self, request: ChatRequest) -> Result<BoxStream<'static, Chunk>>;

    /// `Name() → string`.
    fn name(&self) -> &str;

    /// `Close() → error`. Most adapters (HTTP-backed) have nothing to
    /// release; the default is a no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// The advertised capabilities of this provider/model combination.
    /// Used by capability-driven routing, never by `ProviderStage` itself.
    fn capabilities(&self) -> &LlmCapabilities;
}
