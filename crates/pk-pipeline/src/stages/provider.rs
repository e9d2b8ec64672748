//! `ProviderStage` (§4.2, §4.5): the tool-call round loop around a single
//! `Provider`. Runs hook dispatch at every phase (before-call, per-chunk,
//! after-call), streams text tokens downstream as they arrive, and
//! dispatches tool calls through a `ToolRegistry` up to `max_tool_rounds`,
//! feeding results back as `tool`-role messages for the next round. Never
//! retries internally — retry, if wanted, is the caller's decision via
//! `pk_providers::RetryingProvider`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;

use pk_domain::{
    Chunk, ContentPart, ElementPayload, Error, EventKind, Message, MessageContent, Result, StreamElement, ToolCall,
    ToolDefinition, Usage,
};
use pk_hooks::HookRegistry;
use pk_providers::{ChatRequest, ChatResponse, Provider};
use pk_tools::{ToolOutcome, ToolRegistry};

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::stages::prompt_assembly::TOOL_DEFINITIONS_KEY;
use crate::time::now_ms;

/// One streamed completion: the joined text, any tool calls the provider
/// asked for, and the terminal `Done` chunk's usage/finish reason.
struct RoundOutcome {
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

pub struct ProviderStage {
    provider: Arc<dyn Provider>,
    hooks: Arc<HookRegistry>,
    tools: Option<Arc<ToolRegistry>>,
    max_tool_rounds: u32,
    model: Option<String>,
    temperature: Option<f32>,
}

impl ProviderStage {
    pub fn new(provider: Arc<dyn Provider>, hooks: Arc<HookRegistry>) -> Self {
        Self {
            provider,
            hooks,
            tools: None,
            max_tool_rounds: 8,
            model: None,
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: u32) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    async fn run_one_round(
        &self,
        ctx: &StageContext,
        messages: &[Message],
        tool_defs: &[ToolDefinition],
        output: &ElementSender,
    ) -> Result<RoundOutcome> {
        let request = ChatRequest {
            messages: messages.to_vec(),
            tools: tool_defs.to_vec(),
            temperature: self.temperature,
            max_tokens: None,
            json_mode: false,
            model: self.model.clone(),
        };

        self.hooks.run_before_call(&request).await?;
        ctx.publish(EventKind::ProviderCallStarted {
            provider: self.provider.name().to_string(),
            model: request.model.clone(),
        });

        let started_at = Instant::now();
        let mut stream = match self.provider.complete_stream(request.clone()).await {
            Ok(stream) => stream,
            Err(err) => {
                ctx.publish(EventKind::ProviderCallFailed {
                    provider: self.provider.name().to_string(),
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        self.hooks.reset_chunk_interceptors();

        let mut text = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage = None;
        let mut finish_reason = None;

        while let Some(chunk) = stream.next().await {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Canceled("provider stage canceled mid-stream".into()));
            }
            if let Err(err) = self.hooks.run_chunk_interceptors(&chunk).await {
                ctx.publish(EventKind::ProviderCallFailed {
                    provider: self.provider.name().to_string(),
                    reason: err.to_string(),
                });
                return Err(err);
            }
            match chunk {
                Chunk::Token { text: delta } => {
                    text.push_str(&delta);
                    if output.send(StreamElement::text(delta, now_ms())).await.is_err() {
                        break;
                    }
                }
                Chunk::ToolCallFinished { call_id, tool_name, arguments } => {
                    tool_calls.push(ToolCall { call_id, tool_name, arguments });
                }
                Chunk::ToolCallStarted { .. } | Chunk::ToolCallDelta { .. } => {}
                Chunk::Done { usage: u, finish_reason: f } => {
                    usage = u;
                    finish_reason = f;
                }
                Chunk::Error { message } => {
                    ctx.publish(EventKind::ProviderCallFailed {
                        provider: self.provider.name().to_string(),
                        reason: message.clone(),
                    });
                    return Err(Error::ProviderFatal {
                        provider: self.provider.name().to_string(),
                        message,
                    });
                }
            }
        }

        let latency_ms = started_at.elapsed().as_millis() as u64;
        let response = ChatResponse {
            content: text.clone(),
            tool_calls: tool_calls.clone(),
            usage,
            model: request.model.clone().unwrap_or_default(),
            finish_reason: finish_reason.clone(),
        };
        self.hooks.run_after_call(&response).await?;

        ctx.publish(EventKind::ProviderCallCompleted {
            provider: self.provider.name().to_string(),
            model: request.model,
            latency_ms,
            prompt_tokens: usage.map(|u| u.prompt_tokens),
            completion_tokens: usage.map(|u| u.completion_tokens),
            cost_usd: None,
        });

        Ok(RoundOutcome { text, tool_calls, usage, finish_reason })
    }

    async fn dispatch_tool_call(&self, ctx: &StageContext, call: &ToolCall) -> (String, bool) {
        ctx.publish(EventKind::ToolCallStarted {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
        });

        if let Err(err) = self.hooks.run_tool_before(call).await {
            ctx.publish(EventKind::ToolCallFailed {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                reason: err.to_string(),
            });
            return (err.to_string(), true);
        }

        let started_at = Instant::now();
        let outcome = match &self.tools {
            Some(registry) => registry.dispatch(call).await,
            None => Err(Error::ToolError {
                tool_name: call.tool_name.clone(),
                message: "no tool registry configured for this conversation".into(),
            }),
        };
        let latency_ms = started_at.elapsed().as_millis() as u64;
        let (text, is_error) = match outcome {
            Ok(ToolOutcome::Completed(text)) => (text, false),
            Ok(ToolOutcome::Pending { resumption_token }) => {
                (format!("pending approval (resumption token: {resumption_token})"), false)
            }
            Err(err) => (err.to_string(), true),
        };

        if let Err(hook_err) = self.hooks.run_tool_after(call, &text, is_error).await {
            ctx.publish(EventKind::ToolCallFailed {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                reason: hook_err.to_string(),
            });
            return (hook_err.to_string(), true);
        }

        if is_error {
            ctx.publish(EventKind::ToolCallFailed {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                reason: text.clone(),
            });
        } else {
            ctx.publish(EventKind::ToolCallCompleted {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                latency_ms,
            });
        }
        (text, is_error)
    }
}

fn tool_result_message(call_id: &str, content: String, is_error: bool) -> Message {
    let mut message = Message::tool_result(call_id, content);
    if is_error {
        if let MessageContent::Parts(parts) = &mut message.content {
            if let Some(ContentPart::ToolResult { is_error, .. }) = parts.first_mut() {
                *is_error = true;
            }
        }
    }
    message
}

async fn emit_message(output: &ElementSender, message: Message) {
    let _ = output.send(StreamElement::new(ElementPayload::StructuredMessage(message), now_ms())).await;
}

#[async_trait]
impl Stage for ProviderStage {
    fn name(&self) -> &str {
        "provider"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let mut messages = Vec::new();
        let mut tool_defs: Vec<ToolDefinition> = Vec::new();

        while let Some(element) = input.recv().await {
            if let Some(raw) = element.metadata.get(TOOL_DEFINITIONS_KEY) {
                tool_defs = serde_json::from_value(raw.clone())?;
            }
            if let ElementPayload::StructuredMessage(message) = element.payload {
                messages.push(message);
            }
        }

        // Forward the rendered system message and this turn's own new input
        // downstream — StateSave is the only stage that persists a turn, and
        // it only sees what reaches it. Everything between them is replayed
        // history ContextAssembly resent to build this call's context and is
        // already on file; re-forwarding it would re-append it every turn.
        if let Some(system_message) = messages.first().cloned() {
            emit_message(&output, system_message).await;
        }
        if messages.len() > 1 {
            if let Some(new_input) = messages.last().cloned() {
                emit_message(&output, new_input).await;
            }
        }

        let mut final_text = String::new();

        for round in 0..self.max_tool_rounds {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Canceled("provider stage canceled before round".into()));
            }

            let outcome = self.run_one_round(ctx, &messages, &tool_defs, &output).await?;
            final_text = outcome.text;

            if outcome.tool_calls.is_empty() {
                break;
            }

            let assistant_turn = Message::assistant_with_tool_calls(final_text.clone(), outcome.tool_calls.clone());
            messages.push(assistant_turn.clone());
            emit_message(&output, assistant_turn).await;

            for call in &outcome.tool_calls {
                let (content, is_error) = self.dispatch_tool_call(ctx, call).await;
                let tool_message = tool_result_message(&call.call_id, content, is_error);
                messages.push(tool_message.clone());
                emit_message(&output, tool_message).await;
            }

            if round + 1 == self.max_tool_rounds {
                break;
            }
        }

        ctx.publish(EventKind::MessageCreated { role: "assistant".to_string() });
        emit_message(&output, Message::assistant(final_text)).await;
        Ok(())
    }
}
