use std::sync::Arc;

use pk_domain::{Chunk, Error, HookPhase};
use pk_providers::{ChatRequest, ChatResponse};

use crate::decision::Decision;
use crate::traits::{ChunkInterceptor, ProviderHook, SessionHook, ToolHook};

/// Ordered interceptor set for one conversation (§4.4). Hooks run in
/// registration order within a phase; the first `Deny` short-circuits
/// the rest. Registration and turn-dispatch never race — the registry is
/// built once at conversation-open and is read-only for the lifetime of
/// every turn it serves (§5 shared-resource policy).
#[derive(Default)]
pub struct HookRegistry {
    provider_hooks: Vec<Arc<dyn ProviderHook>>,
    tool_hooks: Vec<Arc<dyn ToolHook>>,
    session_hooks: Vec<Arc<dyn SessionHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider_hook(&mut self, hook: Arc<dyn ProviderHook>) -> &mut Self {
        self.provider_hooks.push(hook);
        self
    }

    pub fn register_tool_hook(&mut self, hook: Arc<dyn ToolHook>) -> &mut Self {
        self.tool_hooks.push(hook);
        self
    }

    pub fn register_session_hook(&mut self, hook: Arc<dyn SessionHook>) -> &mut Self {
        self.session_hooks.push(hook);
        self
    }

    /// Resets every registered chunk interceptor's rolling state. Called
    /// by the provider stage once per streaming call, before the first
    /// chunk is dispatched.
    pub fn reset_chunk_interceptors(&self) {
        for hook in &self.provider_hooks {
            if let Some(interceptor) = hook.as_chunk_interceptor() {
                interceptor.reset();
            }
        }
    }

    pub async fn run_before_call(&self, request: &ChatRequest) -> pk_domain::Result<()> {
        for hook in &self.provider_hooks {
            if let Decision::Deny { reason, metadata } = hook.before_call(request).await {
                tracing::info!(hook = hook.name(), phase = "provider_before", %reason, "hook denied provider call");
                return Err(Error::hook_denied(hook.name(), HookPhase::ProviderBefore, reason, metadata));
            }
        }
        Ok(())
    }

    pub async fn run_after_call(&self, response: &ChatResponse) -> pk_domain::Result<()> {
        for hook in &self.provider_hooks {
            if let Decision::Deny { reason, metadata } = hook.after_call(response).await {
                tracing::info!(hook = hook.name(), phase = "provider_after", %reason, "hook denied provider response");
                return Err(Error::hook_denied(hook.name(), HookPhase::ProviderAfter, reason, metadata));
            }
        }
        Ok(())
    }

    /// Runs every registered chunk interceptor against one chunk, in
    /// registration order. The first `Deny` aborts; §8 requires this to
    /// still surface exactly one `HookDenied` even on the very first chunk.
    pub async fn run_chunk_interceptors(&self, chunk: &Chunk) -> pk_domain::Result<()> {
        for hook in &self.provider_hooks {
            let Some(interceptor) = hook.as_chunk_interceptor() else {
                continue;
            };
            if let Decision::Deny { reason, metadata } = interceptor.on_chunk(chunk).await {
                tracing::info!(hook = interceptor.name(), phase = "chunk", %reason, "hook denied streaming chunk");
                return Err(Error::hook_denied(interceptor.name(), HookPhase::Chunk, reason, metadata));
            }
        }
        Ok(())
    }

    pub async fn run_tool_before(&self, call: &pk_domain::ToolCall) -> pk_domain::Result<()> {
        for hook in &self.tool_hooks {
            if let Decision::Deny { reason, metadata } = hook.before_execution(call).await {
                tracing::info!(hook = hook.name(), phase = "tool_before", tool = %call.tool_name, %reason, "hook denied tool call");
                return Err(Error::hook_denied(hook.name(), HookPhase::ToolBefore, reason, metadata));
            }
        }
        Ok(())
    }

    pub async fn run_tool_after(
        &self,
        call: &pk_domain::ToolCall,
        result: &str,
        is_error: bool,
    ) -> pk_domain::Result<()> {
        for hook in &self.tool_hooks {
            if let Decision::Deny { reason, metadata } = hook.after_execution(call, result, is_error).await {
                tracing::info!(hook = hook.name(), phase = "tool_after", tool = %call.tool_name, %reason, "hook denied tool result");
                return Err(Error::hook_denied(hook.name(), HookPhase::ToolAfter, reason, metadata));
            }
        }
        Ok(())
    }

    pub async fn run_session_start(&self, conversation_id: &str) -> pk_domain::Result<()> {
        for hook in &self.session_hooks {
            hook.on_start(conversation_id).await?;
        }
        Ok(())
    }

    pub async fn run_session_turn_update(&self, conversation_id: &str) -> pk_domain::Result<()> {
        for hook in &self.session_hooks {
            hook.on_turn_update(conversation_id).await?;
        }
        Ok(())
    }

    pub async fn run_session_end(&self, conversation_id: &str) -> pk_domain::Result<()> {
        for hook in &self.session_hooks {
            hook.on_end(conversation_id).await?;
        }
        Ok(())
    }
}
