//! `PromptAssembly` (§4.2): renders the active prompt's system template
//! against the pack's tool ceiling and prepends it to the assembled
//! context. The resolved tool definitions ride along as metadata on the
//! system message element — the documented inter-stage signalling
//! channel — for `ProviderStage` to pick up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use pk_domain::{ElementPayload, Message, Result, StreamElement};
use pk_pack::{render_template, Pack};
use pk_tools::ToolRegistry;

use crate::stage::{ElementReceiver, ElementSender, Stage, StageContext, StageKind};
use crate::time::now_ms;

pub const TOOL_DEFINITIONS_KEY: &str = "tool_definitions";

pub struct PromptAssembly {
    pack: Arc<Pack>,
    prompt_name: String,
    tools: Option<Arc<ToolRegistry>>,
    variables: HashMap<String, String>,
}

impl PromptAssembly {
    pub fn new(pack: Arc<Pack>, prompt_name: impl Into<String>) -> Self {
        Self {
            pack,
            prompt_name: prompt_name.into(),
            tools: None,
            variables: HashMap::new(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }
}

#[async_trait]
impl Stage for PromptAssembly {
    fn name(&self) -> &str {
        "prompt_assembly"
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn process(&self, ctx: &StageContext, mut input: ElementReceiver, output: ElementSender) -> Result<()> {
        let prompt = self.pack.prompt(&self.prompt_name)?;
        let rendered = render_template(&prompt.system_template, &self.variables);

        let tool_defs = self
            .tools
            .as_ref()
            .map(|registry| registry.definitions_for(&prompt.allowed_tools))
            .unwrap_or_default();

        let system_element = StreamElement::new(ElementPayload::StructuredMessage(Message::system(rendered)), now_ms())
            .with_metadata(TOOL_DEFINITIONS_KEY, serde_json::to_value(&tool_defs)?);

        if output.send(system_element).await.is_err() {
            return Ok(());
        }

        while let Some(element) = input.recv().await {
            if ctx.cancel.is_cancelled() {
                break;
            }
            if output.send(element).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
