//! Memory: per-user facts, collective knowledge, episodic timeline, the
//! knowledge graph, and the orchestrator that feeds them into prompts and
//! persists new facts after each turn.

pub mod cache;
pub mod extraction;
pub mod kg;
pub mod repository;

pub use cache::EntityCache;
pub use extraction::{ExtractedFact, FactExtractor};
pub use kg::KnowledgeGraphRepository;
pub use repository::{MemoryFact, MemoryRepository};

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use zantara_llm::ChatGateway;
use zantara_vector::{EmbeddingsGenerator, QdrantClient};

/// Everything the prompt builder needs to personalize a turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryContext {
    pub profile_facts: Vec<String>,
    pub collective_facts: Vec<String>,
    pub timeline_summary: String,
    pub kg_entities: Vec<Value>,
    pub summary: String,
    pub counters: Map<String, Value>,
}

/// Outcome of the post-turn persistence pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationMemoryResult {
    pub facts_extracted: usize,
    pub facts_saved: usize,
    pub processing_time_ms: f64,
    pub success: bool,
}

/// Coordinates repository, knowledge graph, collective store, and fact
/// extraction. Shared process-wide behind an `Arc`.
pub struct MemoryOrchestrator {
    repository: MemoryRepository,
    kg: KnowledgeGraphRepository,
    extractor: FactExtractor,
    embedder: EmbeddingsGenerator,
    collective_store: Arc<QdrantClient>,
}

impl MemoryOrchestrator {
    pub fn new(
        pool: PgPool,
        gateway: Arc<dyn ChatGateway>,
        embedder: EmbeddingsGenerator,
        collective_store: Arc<QdrantClient>,
        max_facts_per_user: i64,
        summary_max_chars: usize,
    ) -> Self {
        Self {
            repository: MemoryRepository::new(pool.clone(), max_facts_per_user, summary_max_chars),
            kg: KnowledgeGraphRepository::new(pool),
            extractor: FactExtractor::new(gateway),
            embedder,
            collective_store,
        }
    }

    pub fn repository(&self) -> &MemoryRepository {
        &self.repository
    }

    pub fn knowledge_graph(&self) -> &KnowledgeGraphRepository {
        &self.kg
    }

    /// Read path: assemble the full memory context for one user.
    ///
    /// Collective facts are retrieved by query semantics when a query is
    /// given; failures degrade to an empty section, never an error.
    pub async fn get_user_context(&self, user_email: &str, query: Option<&str>) -> MemoryContext {
        let mut context = MemoryContext::default();

        match self.repository.get_facts(user_email).await {
            Ok(facts) => context.profile_facts = facts.into_iter().map(|f| f.content).collect(),
            Err(err) => warn!(user = user_email, "failed to load personal facts: {err}"),
        }

        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            context.collective_facts = self.search_collective(query, 5).await;
        }

        match self.repository.recent_timeline(user_email, 5).await {
            Ok(timeline) => context.timeline_summary = timeline,
            Err(err) => warn!(user = user_email, "failed to load timeline: {err}"),
        }

        match self.kg.get_user_related_entities(user_email, 10).await {
            Ok(entities) => context.kg_entities = entities,
            Err(err) => warn!(user = user_email, "failed to load kg entities: {err}"),
        }

        match self.repository.get_summary_and_counters(user_email).await {
            Ok((summary, counters)) => {
                context.summary = summary;
                context.counters = counters;
            }
            Err(err) => warn!(user = user_email, "failed to load counters: {err}"),
        }

        debug!(
            user = user_email,
            personal = context.profile_facts.len(),
            collective = context.collective_facts.len(),
            kg = context.kg_entities.len(),
            "memory context assembled"
        );
        context
    }

    async fn search_collective(&self, query: &str, limit: usize) -> Vec<String> {
        let embedding = match self.embedder.generate_query_embedding(query).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!("collective memory embedding failed: {err}");
                return Vec::new();
            }
        };
        match self.collective_store.search(&embedding, None, limit, None).await {
            Ok(response) => response
                .documents
                .into_iter()
                .filter(|d| !d.is_empty())
                .collect(),
            Err(err) => {
                warn!("collective memory search failed: {err}");
                Vec::new()
            }
        }
    }

    /// Write path: extract facts from a finished exchange and persist them.
    ///
    /// Called as a fire-and-forget task after streaming completes; database
    /// errors are logged and reported in the result, never raised.
    pub async fn process_conversation(
        &self,
        user_email: &str,
        user_message: &str,
        ai_response: &str,
    ) -> ConversationMemoryResult {
        let started = Instant::now();
        let mut result = ConversationMemoryResult::default();

        let facts = match self.extractor.extract(user_message, ai_response).await {
            Ok(facts) => facts,
            Err(err) => {
                warn!(user = user_email, "fact extraction failed: {err}");
                result.processing_time_ms = elapsed_ms(started);
                return result;
            }
        };
        result.facts_extracted = facts.len();

        if let Err(err) = self.repository.ensure_user(user_email).await {
            warn!(user = user_email, "failed to ensure user: {err}");
            result.processing_time_ms = elapsed_ms(started);
            return result;
        }

        for fact in &facts {
            match self
                .repository
                .add_fact(
                    user_email,
                    &fact.content,
                    Some(&fact.fact_type),
                    fact.confidence,
                    Some("conversation"),
                    None,
                )
                .await
            {
                Ok(true) => result.facts_saved += 1,
                Ok(false) => {} // duplicate, idempotent under identical content
                Err(err) => warn!(user = user_email, "failed to save fact: {err}"),
            }
        }

        if let Err(err) = self.repository.bump_conversation_counter(user_email).await {
            warn!(user = user_email, "failed to bump counters: {err}");
        }

        result.success = true;
        result.processing_time_ms = elapsed_ms(started);
        if result.facts_saved > 0 {
            info!(
                user = user_email,
                extracted = result.facts_extracted,
                saved = result.facts_saved,
                "conversation memory persisted"
            );
        }
        result
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    let elapsed: Duration = started.elapsed();
    (elapsed.as_secs_f64() * 1000.0 * 10.0).round() / 10.0
}
