//! The orchestrator: assembles the gateway, tool registry, retrieval,
//! memory, prompt builder, and response pipeline into the two public entry
//! points, `process_query` and `stream_query`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::{Value, json};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use zantara_agent::{
    AgentState, AgentStep, GatewayVerifier, PipelineData, ReasoningEngine, ResponsePipeline,
    Source, Verifier, create_default_pipeline, post_process_response, unwrap_vector_search,
};
use zantara_config::AppConfig;
use zantara_llm::{ChatGateway, ChatSession, LlmGateway, ModelTier, history_from_json};
use zantara_memory::MemoryOrchestrator;
use zantara_prompt::communication::{is_out_of_domain, out_of_domain_response};
use zantara_prompt::{
    PromptContext, SystemPromptBuilder, check_casual_conversation, check_greetings,
    check_identity_questions,
};
use zantara_retrieval::SearchService;
use zantara_tools::{ToolExecutionCounter, ToolRegistry, execute_tool, parse_tool_call};
use zantara_vector::EmbeddingsGenerator;

use crate::cache::SemanticCache;
use crate::context::{UserContext, get_user_context, search_memory_vector};
use crate::context_window::{ContextWindowManager, truncate_history_fallback};
use crate::events::StreamEvent;
use crate::intent::{Intent, IntentClassifier, KeywordIntentClassifier, SuggestedAi};
use crate::result::QueryResult;

/// User ids with this prefix persist memory synchronously so long-term
/// memory tests can observe the write.
const TEST_USER_PREFIX: &str = "ltm_user_";

/// Token streaming only kicks in for substantial answers.
const MIN_STREAMED_ANSWER_CHARS: usize = 50;
const TOKEN_PACING: Duration = Duration::from_millis(10);

/// Verification below this triggers one self-correction pass.
const SELF_CORRECTION_THRESHOLD: f64 = 0.7;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("invalid user_id format")]
    InvalidUserId,
}

pub struct AgenticOrchestrator {
    gateway: Arc<dyn ChatGateway>,
    registry: ToolRegistry,
    search: Arc<SearchService>,
    memory: Option<Arc<MemoryOrchestrator>>,
    pool: Option<PgPool>,
    prompt_builder: SystemPromptBuilder,
    pipeline: ResponsePipeline,
    engine: ReasoningEngine,
    intent_classifier: Box<dyn IntentClassifier>,
    semantic_cache: SemanticCache,
    model_flash: String,
    model_pro: String,
    model_lite: String,
}

impl AgenticOrchestrator {
    /// Production wiring from configuration. The tool registry's function
    /// declarations feed the gateway's native function-call surface.
    pub fn from_config(config: &AppConfig, pool: Option<PgPool>) -> Result<Self> {
        config.validate()?;
        let embedder = EmbeddingsGenerator::from_config(config)?;
        let search = Arc::new(SearchService::new(config, embedder.clone()));

        // Tools hold their own gateway handle (vision, diagnostics); the
        // reasoning gateway additionally carries the declarations projected
        // from the registry.
        let tool_gateway = Arc::new(LlmGateway::from_config(config));
        let registry =
            zantara_tools::builtins::default_registry(search.clone(), tool_gateway.clone(), pool.clone());
        let declarations = registry.function_declarations();
        let gateway: Arc<dyn ChatGateway> =
            Arc::new(LlmGateway::from_config(config).with_function_declarations(declarations));

        let memory = pool.clone().map(|pool| {
            let collective_store = Arc::new(zantara_vector::QdrantClient::new(
                &config.qdrant.url,
                "zantara_collective",
                if config.qdrant.api_key.is_empty() { None } else { Some(config.qdrant.api_key.clone()) },
                Duration::from_secs(config.qdrant.timeout_secs),
            ));
            Arc::new(MemoryOrchestrator::new(
                pool,
                gateway.clone(),
                embedder,
                collective_store,
                config.memory.max_facts_per_user,
                config.memory.summary_max_chars,
            ))
        });

        let verifier: Arc<dyn Verifier> = Arc::new(GatewayVerifier::new(gateway.clone()));
        Ok(Self::assemble(
            gateway,
            registry,
            search,
            memory,
            pool,
            verifier,
            config,
        ))
    }

    /// Assembly seam used by `from_config` and by tests that substitute a
    /// scripted gateway or deterministic verifier.
    pub fn assemble(
        gateway: Arc<dyn ChatGateway>,
        registry: ToolRegistry,
        search: Arc<SearchService>,
        memory: Option<Arc<MemoryOrchestrator>>,
        pool: Option<PgPool>,
        verifier: Arc<dyn Verifier>,
        config: &AppConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            search,
            memory,
            pool,
            prompt_builder: SystemPromptBuilder::new(),
            pipeline: create_default_pipeline(verifier),
            engine: ReasoningEngine,
            intent_classifier: Box::new(KeywordIntentClassifier),
            semantic_cache: SemanticCache::default(),
            model_flash: config.llm.model_flash.clone(),
            model_pro: config.llm.model_pro.clone(),
            model_lite: config.llm.model_flash_lite.clone(),
        }
    }

    pub fn search_service(&self) -> &Arc<SearchService> {
        &self.search
    }

    fn validate_request(query: &str, user_id: Option<&str>) -> Result<()> {
        if query.trim().is_empty() {
            return Err(OrchestratorError::EmptyQuery.into());
        }
        if let Some(user_id) = user_id {
            if user_id != "anonymous" && user_id.trim().is_empty() {
                return Err(OrchestratorError::InvalidUserId.into());
            }
        }
        Ok(())
    }

    fn tier_for(&self, intent: &Intent) -> (ModelTier, bool) {
        match intent.suggested_ai {
            SuggestedAi::DeepThink => (ModelTier::Pro, true),
            SuggestedAi::Pro => (ModelTier::Pro, false),
            SuggestedAi::Fast => (ModelTier::Flash, intent.deep_think_mode),
        }
    }

    fn model_name_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Pro => &self.model_pro,
            ModelTier::Lite => &self.model_lite,
            _ => &self.model_flash,
        }
    }

    /// Caller-provided history wins over the stored conversation; anything
    /// that is not a list of objects is reset to empty.
    fn select_history(provided: Option<Vec<Value>>, context: &UserContext) -> Vec<Value> {
        let history = match provided {
            Some(history) if !history.is_empty() => history,
            _ => context.history.clone(),
        };
        if history.iter().any(|m| !m.is_object()) {
            warn!("history contains non-object entries, resetting to empty");
            return Vec::new();
        }
        history
    }

    fn prompt_context(context: &UserContext) -> PromptContext {
        PromptContext {
            profile: context.profile.clone(),
            facts: context.facts.clone(),
            collective_facts: context.collective_facts.clone(),
            timeline_summary: context.timeline_summary.clone(),
            entities: context.entities.clone(),
            rag_results: None,
        }
    }

    fn additional_context(context: &UserContext) -> String {
        if context.memory_vector_candidates.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = context
            .memory_vector_candidates
            .iter()
            .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
            .map(|t| format!("- {t}"))
            .collect();
        format!(
            "\n### MEMORY CANDIDATES (context hints, not verified evidence):\n{}",
            lines.join("\n")
        )
    }

    fn compress_history(history: &[Value]) -> (Vec<Value>, String) {
        if history.is_empty() {
            return (Vec::new(), String::new());
        }
        let processed = ContextWindowManager::default().process_conversation_history(history);
        if processed.total_messages == 0 {
            // Every entry was malformed; the simple truncation fallback at
            // least preserves whatever text survives rendering.
            return truncate_history_fallback(history);
        }
        info!(
            total = processed.total_messages,
            in_context = processed.messages_in_context,
            tokens = processed.tokens,
            "conversation history compressed"
        );
        (processed.messages, processed.formatted_context)
    }

    fn initial_prompt(system_prompt: &str, history_text: &str, query: &str) -> String {
        format!(
            "{system_prompt}\n\n### CONVERSATION HISTORY (FROM PREVIOUS TURNS):\n{history_text}\n### END HISTORY\n\nUser Query: {query}\n\nIMPORTANT: Do NOT start with philosophical statements about lacking context. If you need information, IMMEDIATELY call vector_search or other tools. Provide a direct answer or use tools right away."
        )
    }

    async fn load_context(
        &self,
        user_id: Option<&str>,
        query: &str,
        intent: &Intent,
    ) -> UserContext {
        let mut context = get_user_context(
            self.pool.as_ref(),
            user_id,
            self.memory.as_deref(),
            Some(query),
        )
        .await;

        // Recall assist for personal/team intents only.
        if matches!(intent.category.as_str(), "identity" | "team_query") {
            let candidates = search_memory_vector(&self.search, query, user_id, 5).await;
            if !candidates.is_empty() {
                info!(count = candidates.len(), "memory vector candidates attached");
                context.memory_vector_candidates = candidates;
            }
        }
        context
    }

    /// Persist conversation memory after the reply; synchronous only for
    /// the reserved test prefix so tests can observe the write.
    fn persist_memory(
        &self,
        user_id: Option<&str>,
        query: &str,
        answer: &str,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let user_id = user_id.filter(|u| !u.is_empty() && *u != "anonymous")?.to_string();
        let memory = self.memory.clone()?;
        let query = query.to_string();
        let answer = answer.to_string();
        Some(tokio::spawn(async move {
            let result = memory.process_conversation(&user_id, &query, &answer).await;
            if !result.success {
                warn!(user = %user_id, "memory persistence did not complete");
            }
        }))
    }

    // ── Non-streaming entry point ───────────────────────────────────────────

    pub async fn process_query(
        &self,
        query: &str,
        user_id: Option<&str>,
        conversation_history: Option<Vec<Value>>,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        Self::validate_request(query, user_id)?;
        let mut tool_counter = ToolExecutionCounter::default();

        // 0. Hardcoded patterns: greetings, identity.
        if let Some(greeting) = check_greetings(query) {
            info!("greeting short-circuit");
            return Ok(QueryResult::short_circuit(
                greeting,
                "greeting-pattern",
                started.elapsed().as_secs_f64(),
            ));
        }
        if let Some(identity) = check_identity_questions(query) {
            info!("identity short-circuit");
            return Ok(QueryResult::short_circuit(
                identity,
                "identity-pattern",
                started.elapsed().as_secs_f64(),
            ));
        }

        // 0.5 Out-of-domain gate.
        if let Some(reason) = is_out_of_domain(query) {
            info!(reason, "out-of-domain query rejected");
            return Ok(QueryResult::short_circuit(
                out_of_domain_response(reason),
                format!("out-of-domain-{reason}"),
                started.elapsed().as_secs_f64(),
            ));
        }

        // 1. Semantic cache.
        if let Some(mut cached) = self.semantic_cache.get_cached_result(query) {
            info!("cache hit, returning cached result");
            cached.cache_hit = Some("exact".to_string());
            cached.execution_time = started.elapsed().as_secs_f64();
            return Ok(cached);
        }

        // 2. Quality routing.
        let intent = self.intent_classifier.classify_intent(query).await;
        let (tier, deep_think) = self.tier_for(&intent);
        debug!(category = %intent.category, ?tier, deep_think, "intent classified");

        // 3. Context + history + prompt.
        let context = self.load_context(user_id, query, &intent).await;
        let history = Self::select_history(conversation_history, &context);
        let system_prompt = self.prompt_builder.build_system_prompt(
            user_id.unwrap_or("anonymous"),
            &Self::prompt_context(&context),
            query,
            deep_think,
            &Self::additional_context(&context),
        );

        // 3.5 Casual conversation: answer directly, no tool use.
        if check_casual_conversation(query) {
            debug!("casual conversation, answering without tools");
            let mut chat = ChatSession::with_history(
                self.model_name_for(tier),
                history_from_json(&history),
            );
            let reply = self
                .gateway
                .send_message(&mut chat, query, &system_prompt, tier, false)
                .await?;
            let answer = post_process_response(&reply.text, query);
            let mut result = QueryResult::short_circuit(
                answer,
                format!("casual-conversation ({})", reply.model_name),
                started.elapsed().as_secs_f64(),
            );
            result.debug_info = json!({"history_len": history.len()});
            return Ok(result);
        }

        let (compressed_history, history_text) = Self::compress_history(&history);
        let mut chat = ChatSession::with_history(
            self.model_name_for(tier),
            history_from_json(&compressed_history),
        );
        let initial_prompt = Self::initial_prompt(&system_prompt, &history_text, query);

        // 4. ReAct loop.
        let outcome = self
            .engine
            .execute_react_loop(
                AgentState::new(query),
                self.gateway.as_ref(),
                &self.registry,
                &mut chat,
                &initial_prompt,
                &system_prompt,
                query,
                user_id,
                tier,
                &mut tool_counter,
            )
            .await?;
        let mut state = outcome.state;

        // 5. Response pipeline, with one self-correction pass on a
        // low-confidence draft.
        let mut verification_status = "skipped".to_string();
        if let Some(answer) = state.final_answer.clone() {
            let data = PipelineData::new(
                answer,
                query,
                state.context_gathered.clone(),
                state.sources.clone(),
            );
            let mut processed = self.pipeline.process(data).await;

            if processed.verification_score < SELF_CORRECTION_THRESHOLD
                && !state.context_gathered.is_empty()
            {
                let verification = processed.verification.clone();
                warn!(
                    score = processed.verification_score,
                    "draft rejected by verifier, applying self-correction"
                );
                let rephrase_prompt = format!(
                    "\nSYSTEM: Your previous answer was REJECTED by the fact-checker.\n\n\
                     REASON: {}\nMISSING/WRONG: {}\n\n\
                     TASK: Rewrite the answer using ONLY the provided context.\n\
                     Do not invent information. If the context is insufficient, admit it.\n",
                    verification
                        .as_ref()
                        .map(|v| v.reasoning.clone())
                        .unwrap_or_else(|| "Insufficient evidence".to_string()),
                    verification
                        .as_ref()
                        .map(|v| v.missing_citations.join(", "))
                        .unwrap_or_default(),
                );
                match self
                    .gateway
                    .send_message(&mut chat, &rephrase_prompt, &system_prompt, tier, false)
                    .await
                {
                    Ok(corrected) => {
                        let data = PipelineData::new(
                            corrected.text,
                            query,
                            state.context_gathered.clone(),
                            state.sources.clone(),
                        );
                        processed = self.pipeline.process(data).await;
                        verification_status = "corrected".to_string();
                    }
                    Err(err) => {
                        error!("self-correction call failed: {err}");
                        verification_status = processed.verification_status.clone();
                    }
                }
            } else {
                verification_status = if processed.verification_status.is_empty() {
                    "valid".to_string()
                } else {
                    processed.verification_status.clone()
                };
            }

            state.final_answer = Some(processed.response.clone());
            state.sources = processed.citations.clone();
        }

        let answer = state.final_answer.clone().unwrap_or_default();
        let mut result = QueryResult {
            answer: answer.clone(),
            sources: number_sources(state.sources.clone()),
            context_used: initial_prompt.len(),
            execution_time: started.elapsed().as_secs_f64(),
            route_used: format!("agentic-rag ({})", outcome.model_used),
            steps: QueryResult::steps_from_state(&state),
            tools_called: state.tools_called(),
            total_steps: state.steps.len(),
            verification_status,
            cache_hit: None,
            debug_info: json!({
                "history_len": compressed_history.len(),
                "initial_prompt_tail": tail(&initial_prompt, 1000),
                "memory_error": context.memory_error,
            }),
        };

        // 6. Cache for future identical queries. Exact-match only: the
        // stored embedding is a deterministic placeholder.
        if !answer.is_empty() {
            self.semantic_cache
                .cache_result(query, vec![0.0; 384], result.clone());
        }

        // 7. Background memory persistence (synchronous for test users).
        if !answer.is_empty() {
            if let Some(user) = user_id.filter(|u| u.starts_with(TEST_USER_PREFIX)) {
                if let Some(memory) = &self.memory {
                    let saved = memory.process_conversation(user, query, &answer).await;
                    result.debug_info["memory_save_result"] = json!({
                        "extracted": saved.facts_extracted,
                        "saved": saved.facts_saved,
                        "success": saved.success,
                    });
                }
            } else {
                let _ = self.persist_memory(user_id, query, &answer);
            }
        }

        Ok(result)
    }

    // ── Streaming entry point ───────────────────────────────────────────────

    /// Spawned streaming pipeline; events arrive on the returned channel.
    /// The response pipeline runs after token streaming to keep first-byte
    /// latency low; citations are emitted once processed.
    pub fn stream_query(
        self: &Arc<Self>,
        query: String,
        user_id: Option<String>,
        conversation_history: Option<Vec<Value>>,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .run_stream(query, user_id, conversation_history, tx)
                .await;
        });
        rx
    }

    async fn run_stream(
        self: Arc<Self>,
        query: String,
        user_id: Option<String>,
        conversation_history: Option<Vec<Value>>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let started = Instant::now();
        let user_ref = user_id.as_deref();

        if let Err(err) = Self::validate_request(&query, user_ref) {
            let _ = tx.send(StreamEvent::Error(err.to_string())).await;
            let _ = tx.send(StreamEvent::Done(Value::Null)).await;
            return;
        }

        // Out-of-domain queries stream the rejection immediately.
        if let Some(reason) = is_out_of_domain(&query) {
            let response = out_of_domain_response(reason);
            let _ = tx
                .send(StreamEvent::Metadata(json!({"status": "out-of-domain", "reason": reason})))
                .await;
            for word in response.split_whitespace() {
                let _ = tx.send(StreamEvent::Token(format!("{word} "))).await;
                tokio::time::sleep(TOKEN_PACING).await;
            }
            let _ = tx.send(StreamEvent::Done(Value::Null)).await;
            return;
        }

        let intent = self.intent_classifier.classify_intent(&query).await;
        let (tier, deep_think) = self.tier_for(&intent);
        let model_name = self.model_name_for(tier).to_string();
        let mode = match intent.suggested_ai {
            SuggestedAi::DeepThink => "deep_think",
            SuggestedAi::Pro => "pro",
            SuggestedAi::Fast => "fast",
        };

        let mut state = AgentState::new(&query);
        let mut tool_counter = ToolExecutionCounter::default();

        let context = self.load_context(user_ref, &query, &intent).await;
        let history = Self::select_history(conversation_history, &context);
        let system_prompt = self.prompt_builder.build_system_prompt(
            user_ref.unwrap_or("anonymous"),
            &Self::prompt_context(&context),
            &query,
            deep_think,
            &Self::additional_context(&context),
        );

        let _ = tx
            .send(StreamEvent::Metadata(
                json!({"status": "started", "model": model_name, "mode": mode}),
            ))
            .await;

        let (compressed_history, history_text) = Self::compress_history(&history);
        let mut chat =
            ChatSession::with_history(&model_name, history_from_json(&compressed_history));
        let initial_prompt = Self::initial_prompt(&system_prompt, &history_text, &query);

        // ReAct loop, inlined so each turn can emit progress events.
        while state.current_step < state.max_steps {
            state.current_step += 1;
            let _ = tx
                .send(StreamEvent::Status(format!("Step {}: Thinking...", state.current_step)))
                .await;

            let message = if state.current_step == 1 {
                initial_prompt.clone()
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

            let reply = match self
                .gateway
                .send_message(&mut chat, &message, &system_prompt, tier, true)
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    error!("streaming chat interaction failed: {err}");
                    let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                    break;
                }
            };

            let tool_call = parse_tool_call(reply.raw.as_ref(), &reply.text);
            if let Some(mut tool_call) = tool_call {
                let _ = tx
                    .send(StreamEvent::ToolStart {
                        name: tool_call.tool_name.clone(),
                        args: Value::Object(tool_call.arguments.clone()),
                    })
                    .await;

                let observation = match execute_tool(
                    &self.registry,
                    &tool_call.tool_name,
                    &tool_call.arguments,
                    user_ref,
                    &mut tool_counter,
                )
                .await
                {
                    Ok(observation) => observation,
                    Err(err) => {
                        let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                        break;
                    }
                };

                let observation = if tool_call.tool_name == "vector_search" {
                    unwrap_vector_search(observation, &mut state.sources)
                } else {
                    observation
                };

                tool_call.result = Some(observation.clone());
                let _ = tx
                    .send(StreamEvent::ToolEnd { result: truncate_chars(&observation, 200) })
                    .await;

                state.steps.push(AgentStep::with_action(
                    state.current_step,
                    reply.text.clone(),
                    tool_call,
                    observation.clone(),
                ));
                state.context_gathered.push(observation);
            } else if reply.text.contains("Final Answer:")
                || state.current_step >= state.max_steps
            {
                let mut final_text = reply.text.clone();
                if reply.text.contains("Final Answer:") {
                    if let Some(tail) = reply.text.split("Final Answer:").last() {
                        final_text = tail.trim().to_string();
                    }
                }
                // Quick clean for streaming; the full pipeline runs later.
                let final_text = post_process_response(&final_text, &query);
                state.final_answer = Some(final_text.clone());
                state
                    .steps
                    .push(AgentStep::final_step(state.current_step, reply.text));

                if final_text.chars().count() >= MIN_STREAMED_ANSWER_CHARS {
                    stream_tokens(&tx, &final_text).await;
                } else {
                    let _ = tx
                        .send(StreamEvent::Status("Generating enhanced answer...".to_string()))
                        .await;
                }
                break;
            } else {
                state
                    .steps
                    .push(AgentStep::thought(state.current_step, reply.text));
            }
        }

        // Final-answer synthesis when the loop exited on gathered context.
        if state.final_answer.is_none() && !state.context_gathered.is_empty() {
            let _ = tx
                .send(StreamEvent::Status("Generating final answer...".to_string()))
                .await;
            let context_joined = state.context_gathered.join("\n\n");
            let final_prompt = format!("Based on: {context_joined}\n\nAnswer: {query}");
            match self
                .gateway
                .send_message(&mut chat, &final_prompt, &system_prompt, tier, false)
                .await
            {
                Ok(reply) => {
                    let answer = post_process_response(&reply.text, &query);
                    if answer.chars().count() >= MIN_STREAMED_ANSWER_CHARS {
                        stream_tokens(&tx, &answer).await;
                    } else {
                        let _ = tx
                            .send(StreamEvent::Status(
                                "Answer too short, searching for more information...".to_string(),
                            ))
                            .await;
                    }
                    state.final_answer = Some(answer);
                }
                Err(err) => {
                    error!("failed to generate final answer in stream: {err}");
                    let _ = tx
                        .send(StreamEvent::Error("Failed to generate final answer.".to_string()))
                        .await;
                }
            }
        }

        // Post-stream pipeline: verification and citation processing run
        // after tokens so they never block first byte.
        let mut verification_score = 1.0;
        let mut citations: Vec<Source> = Vec::new();
        if let Some(answer) = &state.final_answer {
            let data = PipelineData::new(
                answer.clone(),
                &query,
                state.context_gathered.clone(),
                state.sources.clone(),
            );
            let processed = self.pipeline.process(data).await;
            verification_score = processed.verification_score;
            citations = processed.citations;
            state.final_answer = Some(processed.response);
        }

        let emotional_state = detect_emotional_state(state.final_answer.as_deref().unwrap_or(""));

        let _ = tx
            .send(StreamEvent::Metadata(json!({
                "status": "completed",
                "execution_time": started.elapsed().as_secs_f64(),
                "route_used": format!("{mode} ({model_name})"),
                "context_length": history_text.len(),
                "emotional_state": emotional_state,
                "verification_score": (verification_score * 100.0) as i64,
            })))
            .await;

        if !citations.is_empty() {
            let _ = tx.send(StreamEvent::Sources(number_sources(citations))).await;
        }

        // Memory persistence after the stream; no cache write on aborts.
        let mut memory_save_result = Value::Null;
        if let Some(answer) = state.final_answer.clone() {
            if let Some(user) = user_ref.filter(|u| u.starts_with(TEST_USER_PREFIX)) {
                if let Some(memory) = &self.memory {
                    let saved = memory.process_conversation(user, &query, &answer).await;
                    memory_save_result = json!({
                        "extracted": saved.facts_extracted,
                        "saved": saved.facts_saved,
                        "success": saved.success,
                    });
                }
            } else {
                let _ = self.persist_memory(user_ref, &query, &answer);
            }
        }

        let done_payload = json!({
            "state": serde_json::to_value(&state).unwrap_or(Value::Null),
            "debug_info": {
                "history_len": compressed_history.len(),
                "memory_save_result": memory_save_result,
            },
        });
        let _ = tx.send(StreamEvent::Done(done_payload)).await;
    }
}

/// Assign citation ids at emit time, preserving score order.
fn number_sources(mut sources: Vec<Source>) -> Vec<Source> {
    for (i, source) in sources.iter_mut().enumerate() {
        source.id = (i + 1) as u32;
    }
    sources
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    }
}

fn tail(text: &str, chars: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(chars)).collect()
}

/// Word-level pseudo-streaming with fixed pacing. The event schema stays
/// identical when a provider delivers true token streaming.
async fn stream_tokens(tx: &mpsc::Sender<StreamEvent>, text: &str) {
    let re = regex::Regex::new(r"\S+|\s+").expect("valid token regex");
    for token in re.find_iter(text) {
        let _ = tx.send(StreamEvent::Token(token.as_str().to_string())).await;
        tokio::time::sleep(TOKEN_PACING).await;
    }
}

/// Coarse emotional read of the final answer for the completion metadata.
fn detect_emotional_state(answer: &str) -> &'static str {
    let lower = answer.to_lowercase();
    if ["understand", "don't worry", "capisco", "tranquillo", "tenang"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "EMPATHETIC"
    } else if answer.contains('!') {
        "WARM"
    } else {
        "NEUTRAL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_are_numbered_in_order() {
        let sources = vec![
            Source { title: "A".to_string(), ..Source::default() },
            Source { title: "B".to_string(), ..Source::default() },
        ];
        let numbered = number_sources(sources);
        assert_eq!(numbered[0].id, 1);
        assert_eq!(numbered[1].id, 2);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 200), "short");
        let long = "x".repeat(300);
        let truncated = truncate_chars(&long, 200);
        assert_eq!(truncated.chars().count(), 203);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn tail_keeps_the_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
    }

    #[test]
    fn emotional_state_detection() {
        assert_eq!(detect_emotional_state("I understand the frustration."), "EMPATHETIC");
        assert_eq!(detect_emotional_state("Great news!"), "WARM");
        assert_eq!(detect_emotional_state("The rate is 11%."), "NEUTRAL");
    }
}
