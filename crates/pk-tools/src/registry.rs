//! Tool dispatch registry. Per the Design Notes, tool-name → handler
//! resolution is a plain name-keyed lookup — no reflective or
//! string-matched dispatch buried in the provider stage's call path —
//! mirroring `pk_providers::ProviderRegistry`'s shape.

use std::collections::HashMap;
use std::sync::Arc;

use pk_domain::{Error, Result, ToolCall, ToolDefinition};

use crate::traits::{ToolHandler, ToolOutcome};

#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    definitions: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(definition.name.clone(), handler);
        self.definitions.insert(definition.name.clone(), definition);
    }

    /// The tool's JSON-Schema definition, for exposure to the provider
    /// (subject to the pack's `allowed_tools` ceiling, enforced by the
    /// caller before building the request).
    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.definitions.get(n).cloned())
            .collect()
    }

    /// Resolves `call.tool_name` to its handler and runs it. A name with
    /// no registered handler is a `ToolError`, fed back to the model as a
    /// tool-role message per §7's tool-error propagation policy — it is
    /// never surfaced to the caller directly.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolOutcome> {
        let handler = self.handlers.get(&call.tool_name).ok_or_else(|| Error::ToolError {
            tool_name: call.tool_name.clone(),
            message: "no handler registered for this tool".to_string(),
        })?;
        handler.execute(call.arguments.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome> {
            Ok(ToolOutcome::Completed(arguments.to_string()))
        }
    }

    fn echo_definition() -> ToolDefinition {
        ToolDefinition {
            name: "echo".into(),
            description: "echoes its arguments".into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn dispatch_resolves_registered_handler() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_definition(), Arc::new(EchoTool));

        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "echo".into(),
            arguments: serde_json::json!({"x": 1}),
        };
        let outcome = registry.dispatch(&call).await.unwrap();
        match outcome {
            ToolOutcome::Completed(text) => assert!(text.contains('1')),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_tool_error() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "missing".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, Error::ToolError { .. }));
    }

    #[test]
    fn definitions_for_filters_to_allowed_ceiling() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_definition(), Arc::new(EchoTool));
        let defs = registry.definitions_for(&["echo".to_string(), "unknown".to_string()]);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }
}
