use async_trait::async_trait;
use pk_domain::Chunk;
use pk_providers::{ChatRequest, ChatResponse};

use crate::decision::Decision;

/// Invoked around every provider call (§4.4 "Provider" category). A hook
/// that also wants to inspect individual streaming chunks overrides
/// `as_chunk_interceptor` to opt in — the registry probes this at
/// dispatch time rather than requiring every provider hook to implement
/// chunk interception.
#[async_trait]
pub trait ProviderHook: Send + Sync {
    fn name(&self) -> &str;

    async fn before_call(&self, _request: &ChatRequest) -> Decision {
        Decision::Allow
    }

    async fn after_call(&self, _response: &ChatResponse) -> Decision {
        Decision::Allow
    }

    fn as_chunk_interceptor(&self) -> Option<&dyn ChunkInterceptor> {
        None
    }
}

/// Invoked once per streaming chunk. A `Deny` here cancels the provider
/// context, discards remaining chunks, and surfaces `HookDenied`
/// immediately — the only hook phase that can abort mid-stream.
#[async_trait]
pub trait ChunkInterceptor: Send + Sync {
    fn name(&self) -> &str;

    async fn on_chunk(&self, chunk: &Chunk) -> Decision;

    /// Clears any rolling buffer kept across chunks. Called once at the
    /// start of each new streaming call so state from a prior turn never
    /// leaks into the next one.
    fn reset(&self) {}
}

/// Invoked around a tool dispatch (§4.4 "Tool" category).
#[async_trait]
pub trait ToolHook: Send + Sync {
    fn name(&self) -> &str;

    async fn before_execution(&self, _call: &pk_domain::ToolCall) -> Decision {
        Decision::Allow
    }

    async fn after_execution(
        &self,
        _call: &pk_domain::ToolCall,
        _result: &str,
        _is_error: bool,
    ) -> Decision {
        Decision::Allow
    }
}

/// Invoked on session lifecycle transitions (§4.4 "Session" category).
/// Session hooks are non-veto: they observe and may fail with an error,
/// but cannot `Deny` a turn the way the other three categories can.
#[async_trait]
pub trait SessionHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_start(&self, _conversation_id: &str) -> pk_domain::Result<()> {
        Ok(())
    }

    async fn on_turn_update(&self, _conversation_id: &str) -> pk_domain::Result<()> {
        Ok(())
    }

    async fn on_end(&self, _conversation_id: &str) -> pk_domain::Result<()> {
        Ok(())
    }
}
