use async_trait::async_trait;
use pk_domain::Result;

/// What a tool dispatch produced. Mirrors the Design Notes' asynchronous
/// tool approval flow: a long-running or human-in-the-loop tool returns
/// `Pending` with an opaque resumption token instead of blocking the
/// turn; the provider stage stores the token on the `ConversationState`
/// and exits, resuming the round only when an incoming element carries
/// the matching approval payload.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Completed(String),
    Pending { resumption_token: serde_json::Value },
}

/// One tool's execution logic. Kept deliberately thin — `ToolRegistry`
/// owns name-to-handler lookup, so a handler only ever needs to know how
/// to run itself given already-validated arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome>;
}
