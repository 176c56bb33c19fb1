//! Rate-limited tool execution. Tool failures become observations so the
//! reasoning loop can recover; only the rate limit aborts the request.

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{ToolArgs, ToolRegistry};

/// Hard ceiling on tool invocations per query.
pub const MAX_TOOL_EXECUTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("Maximum tool executions exceeded ({MAX_TOOL_EXECUTIONS} per query)")]
    RateLimitExceeded,
}

/// Request-local execution counter; never shared across requests.
#[derive(Debug, Default)]
pub struct ToolExecutionCounter {
    count: u32,
}

impl ToolExecutionCounter {
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Execute a tool by name with rate limiting and user-id injection.
///
/// Admin-gated tools read the authenticated `_user_id` from the argument
/// map; it is injected here so the model can never forge it.
pub async fn execute_tool(
    registry: &ToolRegistry,
    tool_name: &str,
    arguments: &ToolArgs,
    user_id: Option<&str>,
    counter: &mut ToolExecutionCounter,
) -> Result<String> {
    counter.count += 1;
    if counter.count > MAX_TOOL_EXECUTIONS {
        warn!(count = counter.count, "tool execution limit exceeded");
        return Err(ToolError::RateLimitExceeded.into());
    }

    let Some(tool) = registry.get(tool_name) else {
        return Ok(format!("Error: Unknown tool '{tool_name}'"));
    };

    let mut arguments = arguments.clone();
    if let Some(user_id) = user_id {
        arguments.insert("_user_id".to_string(), Value::String(user_id.to_string()));
    }

    info!(tool = tool_name, "executing tool");
    match tool.execute(&arguments).await {
        Ok(result) => Ok(result),
        Err(err) => {
            error!(tool = tool_name, "tool execution failed: {err}");
            Ok(format!("Error executing {tool_name}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tool;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, args: &ToolArgs) -> Result<String> {
            let user = args.get("_user_id").and_then(|v| v.as_str()).unwrap_or("-");
            Ok(format!("echo for {user}"))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: &ToolArgs) -> Result<String> {
            anyhow::bail!("boom")
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailingTool));
        registry
    }

    #[tokio::test]
    async fn user_id_is_injected() {
        let registry = registry();
        let mut counter = ToolExecutionCounter::default();
        let out = execute_tool(&registry, "echo", &ToolArgs::new(), Some("zero@balizero.com"), &mut counter)
            .await
            .unwrap();
        assert_eq!(out, "echo for zero@balizero.com");
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_observation() {
        let registry = registry();
        let mut counter = ToolExecutionCounter::default();
        let out = execute_tool(&registry, "missing", &ToolArgs::new(), None, &mut counter)
            .await
            .unwrap();
        assert_eq!(out, "Error: Unknown tool 'missing'");
    }

    #[tokio::test]
    async fn tool_failure_becomes_observation() {
        let registry = registry();
        let mut counter = ToolExecutionCounter::default();
        let out = execute_tool(&registry, "broken", &ToolArgs::new(), None, &mut counter)
            .await
            .unwrap();
        assert_eq!(out, "Error executing broken: boom");
    }

    #[tokio::test]
    async fn eleventh_call_hits_the_rate_limit() {
        let registry = registry();
        let mut counter = ToolExecutionCounter::default();
        for _ in 0..MAX_TOOL_EXECUTIONS {
            execute_tool(&registry, "echo", &ToolArgs::new(), None, &mut counter)
                .await
                .unwrap();
        }
        let err = execute_tool(&registry, "echo", &ToolArgs::new(), None, &mut counter)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ToolError>(),
            Some(&ToolError::RateLimitExceeded)
        );
    }
}
