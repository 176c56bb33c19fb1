use serde::{Deserialize, Serialize};
use serde_json::Value;

use zantara_agent::{AgentState, Source};

/// Condensed reasoning step for the public result surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSummary {
    pub step: u32,
    pub thought: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
}

/// The non-streaming result surface (spec'd field set).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Source>,
    pub context_used: usize,
    pub execution_time: f64,
    pub route_used: String,
    pub steps: Vec<StepSummary>,
    pub tools_called: usize,
    pub total_steps: usize,
    #[serde(default)]
    pub verification_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<String>,
    #[serde(default)]
    pub debug_info: Value,
}

impl QueryResult {
    /// Short-circuit result: no tools, no steps, fixed answer.
    pub fn short_circuit(answer: impl Into<String>, route: impl Into<String>, elapsed: f64) -> Self {
        Self {
            answer: answer.into(),
            route_used: route.into(),
            execution_time: elapsed,
            ..Self::default()
        }
    }

    pub fn steps_from_state(state: &AgentState) -> Vec<StepSummary> {
        state
            .steps
            .iter()
            .map(|s| StepSummary {
                step: s.step_number,
                thought: s.thought.clone(),
                tool_used: s.action.as_ref().map(|a| a.tool_name.clone()),
                tool_result: s.action.as_ref().and_then(|a| {
                    a.result.as_ref().map(|r| r.chars().take(200).collect())
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zantara_tools::ToolCall;

    #[test]
    fn short_circuit_has_no_steps_or_tools() {
        let result = QueryResult::short_circuit("Ciao!", "greeting-pattern", 0.01);
        assert_eq!(result.tools_called, 0);
        assert_eq!(result.total_steps, 0);
        assert!(result.steps.is_empty());
        assert_eq!(result.route_used, "greeting-pattern");
    }

    #[test]
    fn steps_summarize_and_truncate_tool_results() {
        let mut state = AgentState::new("q");
        let mut call = ToolCall::new("vector_search", serde_json::Map::new());
        call.result = Some("x".repeat(500));
        state.steps.push(zantara_agent::AgentStep::with_action(1, "thinking", call, "obs"));

        let steps = QueryResult::steps_from_state(&state);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool_used.as_deref(), Some("vector_search"));
        assert_eq!(steps[0].tool_result.as_ref().unwrap().len(), 200);
    }

    #[test]
    fn result_serializes_roundtrip() {
        let result = QueryResult {
            answer: "answer".to_string(),
            route_used: "agentic-rag (gemini-2.0-flash)".to_string(),
            debug_info: json!({"history_len": 0}),
            ..QueryResult::default()
        };
        let value = serde_json::to_value(&result).unwrap();
        let back: QueryResult = serde_json::from_value(value).unwrap();
        assert_eq!(back.answer, "answer");
        assert_eq!(back.route_used, "agentic-rag (gemini-2.0-flash)");
    }
}
