//! The ReAct loop: thought → action → observation turns until a final
//! answer, the step ceiling, or an early exit on sufficient context.

use anyhow::Result;
use serde_json::Value;
use tracing::{error, info, warn};

use zantara_llm::{ChatGateway, ChatSession, ModelTier};
use zantara_tools::{ToolExecutionCounter, ToolRegistry, execute_tool, parse_tool_call};

use crate::{AgentState, AgentStep, Source};

/// A retrieval observation shorter than this is not enough to stop on.
const EARLY_EXIT_MIN_CHARS: usize = 500;
const NO_RESULTS_SENTINEL: &str = "No relevant documents";

/// Localized graceful-degradation reply for stub model output.
const STUB_FALLBACK: &str = "Mi dispiace, non ho capito bene la tua richiesta. Potresti riformularla? Posso aiutarti con visti, aziende e leggi in Indonesia.";

const SYNTHESIS_FAILURE: &str =
    "I apologize, but I couldn't generate a final answer based on the gathered information.";

/// Loop outcome: the terminal state plus the model that actually served it.
#[derive(Debug)]
pub struct ReactOutcome {
    pub state: AgentState,
    pub model_used: String,
}

/// Drives the reasoning loop. Holds no collaborators: the gateway, tool
/// registry, and chat session are passed in per call.
#[derive(Debug, Clone, Default)]
pub struct ReasoningEngine;

impl ReasoningEngine {
    /// Run the loop to completion.
    ///
    /// Per turn: build the continuation prompt (turn 1 sends the full
    /// initial prompt), call the gateway with function calling enabled,
    /// parse a tool call (native first, regex fallback), dispatch it, and
    /// record the step. Exits on `Final Answer:`, the step ceiling, or a
    /// substantial retrieval observation.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_react_loop(
        &self,
        mut state: AgentState,
        gateway: &dyn ChatGateway,
        registry: &ToolRegistry,
        chat: &mut ChatSession,
        initial_prompt: &str,
        system_prompt: &str,
        query: &str,
        user_id: Option<&str>,
        tier: ModelTier,
        counter: &mut ToolExecutionCounter,
    ) -> Result<ReactOutcome> {
        let mut model_used = "unknown".to_string();

        while state.current_step < state.max_steps {
            state.current_step += 1;

            let message = if state.current_step == 1 {
                initial_prompt.to_string()
            } else {
                let last_observation = state
                    .steps
                    .last()
                    .and_then(|s| s.observation.as_deref())
                    .unwrap_or("");
                format!(
                    "Observation: {last_observation}\n\nContinue with your next thought or provide final answer."
                )
            };

            let reply = match gateway
                .send_message(chat, &message, system_prompt, tier, true)
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    error!(step = state.current_step, "chat interaction failed: {err}");
                    break;
                }
            };
            model_used = reply.model_name.clone();

            let tool_call = parse_tool_call(reply.raw.as_ref(), &reply.text);

            if let Some(mut tool_call) = tool_call {
                info!(
                    tool = %tool_call.tool_name,
                    step = state.current_step,
                    "agent calling tool"
                );
                let mut observation = execute_tool(
                    registry,
                    &tool_call.tool_name,
                    &tool_call.arguments,
                    user_id,
                    counter,
                )
                .await?;

                // Retrieval observations arrive as a JSON envelope: the
                // content becomes the observation, the sources accumulate.
                if tool_call.tool_name == "vector_search" {
                    observation = unwrap_vector_search(observation, &mut state.sources);
                }

                tool_call.result = Some(observation.clone());
                let is_retrieval = tool_call.tool_name == "vector_search";
                state.steps.push(AgentStep::with_action(
                    state.current_step,
                    reply.text.clone(),
                    tool_call,
                    observation.clone(),
                ));
                state.context_gathered.push(observation.clone());

                if is_retrieval
                    && observation.len() > EARLY_EXIT_MIN_CHARS
                    && !observation.contains(NO_RESULTS_SENTINEL)
                {
                    info!("early exit: sufficient context from retrieval");
                    break;
                }
            } else if reply.text.contains("Final Answer:")
                || state.current_step >= state.max_steps
            {
                let final_answer = match reply.text.split("Final Answer:").last() {
                    Some(tail) if reply.text.contains("Final Answer:") => tail.trim().to_string(),
                    _ => reply.text.clone(),
                };
                state.final_answer = Some(final_answer);
                state
                    .steps
                    .push(AgentStep::final_step(state.current_step, reply.text));
                break;
            } else {
                state
                    .steps
                    .push(AgentStep::thought(state.current_step, reply.text));
            }
        }

        // Synthesize a final answer when the loop ended with context but no
        // answer (early exit or exhausted steps mid-research).
        if state.final_answer.is_none() && !state.context_gathered.is_empty() {
            let context = state.context_gathered.join("\n\n");
            let final_prompt = format!(
                "\nBased on the information gathered:\n{context}\n\nProvide a final, comprehensive answer to: {query}\n"
            );
            match gateway
                .send_message(chat, &final_prompt, system_prompt, tier, false)
                .await
            {
                Ok(reply) => {
                    model_used = reply.model_name.clone();
                    state.final_answer = Some(reply.text);
                }
                Err(err) => {
                    error!("failed to generate final answer: {err}");
                    state.final_answer = Some(SYNTHESIS_FAILURE.to_string());
                }
            }
        }

        // Stub filter: some models emit loop book-keeping instead of an
        // answer; replace it with a graceful localized fallback.
        if let Some(answer) = &state.final_answer {
            let lower = answer.to_lowercase();
            if lower.contains("no further action needed") || lower.contains("observation: none") {
                warn!("stub response detected, substituting fallback");
                state.final_answer = Some(STUB_FALLBACK.to_string());
            }
        }

        Ok(ReactOutcome { state, model_used })
    }
}

/// Split a vector_search envelope into observation text and sources.
/// Non-JSON observations pass through untouched. Shared with the streaming
/// loop, which drives its own turn structure to emit events.
pub fn unwrap_vector_search(observation: String, sources: &mut Vec<Source>) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(&observation) else {
        return observation;
    };
    let Some(object) = parsed.as_object() else {
        return observation;
    };
    if !object.contains_key("sources") {
        return observation;
    }

    if let Some(new_sources) = object.get("sources").and_then(|s| s.as_array()) {
        let collected: Vec<Source> =
            new_sources.iter().filter_map(Source::from_tool_json).collect();
        info!(count = collected.len(), "collected sources from vector_search");
        sources.extend(collected);
    }

    object
        .get("content")
        .and_then(|c| c.as_str())
        .map(String::from)
        .unwrap_or(observation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;
    use zantara_llm::GatewayReply;
    use zantara_llm::{Candidate, FunctionCall, RawResponse, ResponsePart};
    use zantara_tools::{Tool, ToolArgs};

    /// Gateway fake that replays a scripted list of replies.
    struct ScriptedGateway {
        replies: Mutex<Vec<GatewayReply>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<GatewayReply>) -> Self {
            Self { replies: Mutex::new(replies), calls: Mutex::new(Vec::new()) }
        }

        fn text_reply(text: &str) -> GatewayReply {
            GatewayReply {
                text: text.to_string(),
                model_name: "fake-model".to_string(),
                raw: Some(RawResponse::default()),
            }
        }

        fn call_reply(tool: &str, args: &[(&str, Value)]) -> GatewayReply {
            let args = args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            GatewayReply {
                text: String::new(),
                model_name: "fake-model".to_string(),
                raw: Some(RawResponse {
                    candidates: vec![Candidate {
                        parts: vec![ResponsePart {
                            text: None,
                            function_call: Some(FunctionCall { name: tool.to_string(), args }),
                        }],
                    }],
                }),
            }
        }
    }

    #[async_trait]
    impl ChatGateway for ScriptedGateway {
        async fn send_message(
            &self,
            _chat: &mut ChatSession,
            message: &str,
            _system_prompt: &str,
            _tier: ModelTier,
            _enable_function_calling: bool,
        ) -> Result<GatewayReply> {
            self.calls.lock().unwrap().push(message.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Ok(ScriptedGateway::text_reply("Final Answer: done"));
            }
            Ok(replies.remove(0))
        }
    }

    /// Search tool fake returning a fixed envelope.
    struct FakeSearchTool {
        content: String,
    }

    #[async_trait]
    impl Tool for FakeSearchTool {
        fn name(&self) -> &str {
            "vector_search"
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: &ToolArgs) -> Result<String> {
            Ok(json!({
                "content": self.content,
                "sources": [
                    {"id": 1, "title": "Doc A", "url": "https://a", "score": 0.9, "category": "visa_oracle"},
                ],
            })
            .to_string())
        }
    }

    fn registry_with_search(content: &str) -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(FakeSearchTool { content: content.to_string() }));
        registry
    }

    async fn run(
        gateway: &ScriptedGateway,
        registry: &ToolRegistry,
    ) -> ReactOutcome {
        let mut chat = ChatSession::new("fake-model");
        let mut counter = ToolExecutionCounter::default();
        ReasoningEngine
            .execute_react_loop(
                AgentState::new("test query"),
                gateway,
                registry,
                &mut chat,
                "INITIAL PROMPT",
                "SYSTEM",
                "test query",
                Some("user@example.com"),
                ModelTier::Flash,
                &mut counter,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn direct_final_answer_terminates_in_one_step() {
        let gateway = ScriptedGateway::new(vec![ScriptedGateway::text_reply(
            "Final Answer: The C1 visa costs Rp 2,300,000.",
        )]);
        let registry = ToolRegistry::default();
        let outcome = run(&gateway, &registry).await;

        assert_eq!(outcome.state.final_answer.as_deref(), Some("The C1 visa costs Rp 2,300,000."));
        assert_eq!(outcome.state.steps.len(), 1);
        assert!(outcome.state.steps[0].is_final);
        assert_eq!(outcome.model_used, "fake-model");
    }

    #[tokio::test]
    async fn early_exit_after_substantial_retrieval_then_synthesis() {
        let long_content = "relevant regulation text ".repeat(30);
        let gateway = ScriptedGateway::new(vec![
            ScriptedGateway::call_reply("vector_search", &[("query", json!("visa"))]),
            ScriptedGateway::text_reply("The synthesized final answer."),
        ]);
        let registry = registry_with_search(&long_content);
        let outcome = run(&gateway, &registry).await;

        // One tool step, then the loop exits early and synthesizes.
        assert_eq!(outcome.state.tools_called(), 1);
        assert_eq!(outcome.state.final_answer.as_deref(), Some("The synthesized final answer."));
        assert_eq!(outcome.state.sources.len(), 1);
        assert_eq!(outcome.state.sources[0].title, "Doc A");
        // The observation is the unwrapped content, not the JSON envelope.
        let observation = outcome.state.steps[0].observation.as_deref().unwrap();
        assert!(observation.starts_with("relevant regulation text"));
        // Synthesis prompt references the gathered context.
        let calls = gateway.calls.lock().unwrap();
        assert!(calls.last().unwrap().contains("Based on the information gathered"));
    }

    #[tokio::test]
    async fn short_retrieval_keeps_looping() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedGateway::call_reply("vector_search", &[("query", json!("visa"))]),
            ScriptedGateway::text_reply("Final Answer: short context answer"),
        ]);
        let registry = registry_with_search("tiny");
        let outcome = run(&gateway, &registry).await;
        assert_eq!(outcome.state.steps.len(), 2);
        assert_eq!(outcome.state.final_answer.as_deref(), Some("short context answer"));
    }

    #[tokio::test]
    async fn max_steps_bounds_the_loop() {
        let thoughts: Vec<GatewayReply> = (0..10)
            .map(|i| ScriptedGateway::text_reply(&format!("thinking about it, round {i}")))
            .collect();
        let gateway = ScriptedGateway::new(thoughts);
        let registry = ToolRegistry::default();
        let outcome = run(&gateway, &registry).await;

        assert!(outcome.state.steps.len() as u32 <= outcome.state.max_steps);
        // The last permitted turn becomes the final answer.
        assert!(outcome.state.final_answer.is_some());
    }

    #[tokio::test]
    async fn stub_responses_are_replaced_with_fallback() {
        let gateway = ScriptedGateway::new(vec![ScriptedGateway::text_reply(
            "Final Answer: No further action needed.",
        )]);
        let registry = ToolRegistry::default();
        let outcome = run(&gateway, &registry).await;
        assert_eq!(outcome.state.final_answer.as_deref(), Some(STUB_FALLBACK));
    }

    #[tokio::test]
    async fn unknown_tool_error_becomes_observation_and_loop_recovers() {
        let gateway = ScriptedGateway::new(vec![
            ScriptedGateway::call_reply("nonexistent_tool", &[]),
            ScriptedGateway::text_reply("Final Answer: recovered"),
        ]);
        let registry = ToolRegistry::default();
        let outcome = run(&gateway, &registry).await;

        assert_eq!(outcome.state.final_answer.as_deref(), Some("recovered"));
        let first_observation = outcome.state.steps[0].observation.as_deref().unwrap();
        assert!(first_observation.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn rate_limit_aborts_the_request() {
        // Eleven consecutive tool calls: the eleventh trips the limit.
        let mut replies: Vec<GatewayReply> = (0..11)
            .map(|_| ScriptedGateway::call_reply("vector_search", &[("query", json!("q"))]))
            .collect();
        replies.push(ScriptedGateway::text_reply("never reached"));
        let gateway = ScriptedGateway::new(replies);
        let registry = registry_with_search("tiny");

        let mut chat = ChatSession::new("fake-model");
        let mut counter = ToolExecutionCounter::default();
        let mut state = AgentState::new("q");
        state.max_steps = 20;
        let result = ReasoningEngine
            .execute_react_loop(
                state,
                &gateway,
                &registry,
                &mut chat,
                "INITIAL",
                "SYSTEM",
                "q",
                None,
                ModelTier::Flash,
                &mut counter,
            )
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn unwrap_passes_non_json_through() {
        let mut sources = Vec::new();
        let out = unwrap_vector_search("plain text observation".to_string(), &mut sources);
        assert_eq!(out, "plain text observation");
        assert!(sources.is_empty());
    }
}
