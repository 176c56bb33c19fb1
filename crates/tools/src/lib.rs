//! Tool layer: a uniform invocation surface over heterogeneous
//! capabilities, with native/regex call parsing and rate-limited execution.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod builtins;
pub mod executor;
pub mod parser;
pub mod pricing;

pub use executor::{ToolError, ToolExecutionCounter, execute_tool};
pub use parser::{parse_native_function_call, parse_tool_call, parse_tool_call_regex};
pub use pricing::PricingService;

use zantara_llm::FunctionDeclaration;

/// Arguments as they arrive from the model: a JSON object.
pub type ToolArgs = Map<String, Value>;

/// A tool invocation requested by the model. `result` is filled in after
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: ToolArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self { tool_name: tool_name.into(), arguments, result: None }
    }
}

/// Trait implemented by every tool. The schema is data: the model's
/// function declarations are projected straight from it.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: &ToolArgs) -> Result<String>;
}

/// Name-keyed registry of the tools available to the reasoning engine.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Project every tool's schema into the gateway's declaration format.
    pub fn function_declarations(&self) -> Vec<FunctionDeclaration> {
        let mut declarations: Vec<FunctionDeclaration> = self
            .tools
            .values()
            .map(|tool| FunctionDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }
}

/// Helpers shared by the tool implementations.
pub(crate) fn arg_str<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub(crate) fn arg_usize(args: &ToolArgs, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use serde_json::json;

    struct DummyTool {
        name: String,
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "dummy tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"input": {"type": "string", "description": "test param"}},
                "required": ["input"],
            })
        }
        async fn execute(&self, _args: &ToolArgs) -> Result<String> {
            Ok(format!("ran {}", self.name))
        }
    }

    #[test]
    fn empty_registry() {
        let registry = ToolRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
        assert!(registry.function_declarations().is_empty());
    }

    #[test]
    fn register_and_get() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(DummyTool { name: "alpha".into() }));
        registry.register(Arc::new(DummyTool { name: "beta".into() }));

        assert!(registry.get("alpha").is_some());
        assert!(registry.get("beta").is_some());
        assert!(registry.get("gamma").is_none());
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn declarations_carry_schemas() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(DummyTool { name: "finder".into() }));

        let declarations = registry.function_declarations();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, "finder");
        assert_eq!(declarations[0].parameters["required"], json!(["input"]));
    }

    /// Later registrations replace earlier ones under the same name; the
    /// registry is a map, not a list.
    #[test]
    fn duplicate_name_last_registration_wins() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(DummyTool { name: "dup".into() }));
        registry.register(Arc::new(DummyTool { name: "dup".into() }));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn run_registered_tool() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(DummyTool { name: "runner".into() }));

        let tool = registry.get("runner").unwrap();
        let output = tool.execute(&ToolArgs::new()).await.unwrap();
        assert_eq!(output, "ran runner");
    }
}
