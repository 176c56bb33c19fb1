//! Core search service: validation, routing, filtered search, reranking,
//! hybrid fusion, and parallel multi-collection conflict resolution.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use zantara_config::AppConfig;
use zantara_vector::{Bm25Vectorizer, EmbeddingsGenerator, QdrantClient, SearchFilter};

use crate::collections;
use crate::conflict::{ConflictReport, ConflictResolver, ConflictStats};
use crate::constants::EARLY_EXIT_SCORE;
use crate::filters::{TierLevel, build_search_filter, tier_filter_for};
use crate::formatter::{ScoredDoc, format_search_results};
use crate::health::{CollectionHealthService, QueryRecord};
use crate::reranker::ReRanker;
use crate::router::QueryRouter;

/// Rejected before any expensive work.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("user level must be between 0 and 3, got {0}")]
    InvalidUserLevel(u8),
}

/// Search outcome. Single-collection paths leave the multi-collection
/// fields at their defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<ScoredDoc>,
    pub user_level: u8,
    pub allowed_tiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_used: Option<String>,
    pub reranked: bool,
    pub early_exit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    pub bm25_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_collection: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections_searched: Vec<String>,
    pub confidence: f32,
    pub conflicts_detected: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictReport>,
    pub fallbacks_used: bool,
}

/// Lazily-constructed clients for the known collections, plus ad-hoc
/// clients for collections discovered at runtime.
pub struct CollectionManager {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    clients: RwLock<HashMap<String, Arc<QdrantClient>>>,
}

impl CollectionManager {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.qdrant.url.clone(),
            api_key: if config.qdrant.api_key.is_empty() {
                None
            } else {
                Some(config.qdrant.api_key.clone())
            },
            timeout: Duration::from_secs(config.qdrant.timeout_secs),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Client for a recognized collection; `None` for unknown names.
    pub async fn get_collection(&self, name: &str) -> Option<Arc<QdrantClient>> {
        if !collections::ALL.contains(&name) {
            return None;
        }
        Some(self.get_or_create(name).await)
    }

    /// Client for any collection, creating one ad hoc when needed.
    pub async fn get_or_create(&self, name: &str) -> Arc<QdrantClient> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(name) {
                return client.clone();
            }
        }
        let client = Arc::new(QdrantClient::new(
            &self.base_url,
            name,
            self.api_key.clone(),
            self.timeout,
        ));
        self.clients
            .write()
            .await
            .entry(name.to_string())
            .or_insert(client)
            .clone()
    }
}

pub struct SearchService {
    embedder: EmbeddingsGenerator,
    bm25: Option<Bm25Vectorizer>,
    pub collection_manager: CollectionManager,
    router: QueryRouter,
    pub conflict_resolver: ConflictResolver,
    pub health_monitor: CollectionHealthService,
    reranker: ReRanker,
    multi_collection_searches: AtomicU64,
}

impl SearchService {
    pub fn new(config: &AppConfig, embedder: EmbeddingsGenerator) -> Self {
        let bm25 = config.retrieval.enable_bm25.then(|| {
            Bm25Vectorizer::new(
                config.retrieval.bm25_vocab_size,
                config.retrieval.bm25_k1,
                config.retrieval.bm25_b,
            )
        });
        info!(
            provider = embedder.provider_name(),
            dims = embedder.dimensions(),
            bm25 = bm25.is_some(),
            "search service initialized"
        );
        Self {
            embedder,
            bm25,
            collection_manager: CollectionManager::from_config(config),
            router: QueryRouter,
            conflict_resolver: ConflictResolver::default(),
            health_monitor: CollectionHealthService::default(),
            reranker: ReRanker::from_config(config),
            multi_collection_searches: AtomicU64::new(0),
        }
    }

    pub fn embedder(&self) -> &EmbeddingsGenerator {
        &self.embedder
    }

    fn validate(query: &str, user_level: u8) -> Result<(), ValidationError> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        if user_level > 3 {
            return Err(ValidationError::InvalidUserLevel(user_level));
        }
        Ok(())
    }

    /// Shared preflight for the single-collection paths: embed, route,
    /// resolve the client, and build the combined access filter.
    async fn prepare_search_context(
        &self,
        query: &str,
        user_level: u8,
        tier_filter: Option<&[TierLevel]>,
        collection_override: Option<&str>,
        apply_filters: Option<bool>,
    ) -> Result<(Vec<f32>, String, Arc<QdrantClient>, Option<SearchFilter>, Vec<String>)> {
        Self::validate(query, user_level)?;

        let query_embedding = self.embedder.generate_query_embedding(query).await?;
        if query_embedding.is_empty() {
            anyhow::bail!("failed to generate query embedding");
        }

        let routing = self.router.route_query(query, collection_override, false);
        let mut collection_name = routing.collection_name;

        let client = match self.collection_manager.get_collection(&collection_name).await {
            Some(client) => client,
            None => {
                error!(collection = %collection_name, "unknown collection, defaulting to legal_unified");
                collection_name = collections::LEGAL_UNIFIED.to_string();
                self.collection_manager
                    .get_collection(&collection_name)
                    .await
                    .expect("default collection must exist")
            }
        };

        let mut allowed = TierLevel::allowed_for_level(user_level);
        if let Some(restriction) = tier_filter {
            allowed.retain(|t| restriction.contains(t));
        }

        // Tier metadata only exists on the books collection.
        let (tier_values, tier_filter_map) = if collection_name == collections::ZANTARA_BOOKS {
            (
                allowed.iter().map(|t| t.as_str().to_string()).collect(),
                tier_filter_for(&allowed),
            )
        } else {
            (Vec::new(), None)
        };

        let mut combined = build_search_filter(tier_filter_map, true);
        if apply_filters == Some(false) {
            combined = None;
        }

        Ok((query_embedding, collection_name, client, combined, tier_values))
    }

    /// Semantic search with tier-based access control and routing.
    pub async fn search(
        &self,
        query: &str,
        user_level: u8,
        limit: usize,
        tier_filter: Option<&[TierLevel]>,
        collection_override: Option<&str>,
        apply_filters: Option<bool>,
    ) -> Result<SearchResults> {
        let (embedding, collection_name, client, filter, tier_values) = self
            .prepare_search_context(query, user_level, tier_filter, collection_override, apply_filters)
            .await?;

        debug!(collection = %collection_name, limit, "dense search");
        let raw = client.search(&embedding, filter.as_ref(), limit, None).await?;
        let formatted = format_search_results(&raw, &collection_name, None);

        let avg_score = if formatted.is_empty() {
            0.0
        } else {
            formatted.iter().map(|r| r.score).sum::<f64>() / formatted.len() as f64
        };
        self.health_monitor
            .record_query(&collection_name, !formatted.is_empty(), formatted.len(), avg_score);

        Ok(SearchResults {
            query: query.to_string(),
            results: formatted,
            user_level,
            allowed_tiers: tier_values,
            collection_used: Some(collection_name),
            ..SearchResults::default()
        })
    }

    /// Overfetch 3×limit and rerank; skipped entirely when the top result
    /// already clears the early-exit threshold.
    pub async fn search_with_reranking(
        &self,
        query: &str,
        user_level: u8,
        limit: usize,
        tier_filter: Option<&[TierLevel]>,
        collection_override: Option<&str>,
    ) -> Result<SearchResults> {
        let initial_limit = limit * 3;
        let mut results = self
            .search(query, user_level, initial_limit, tier_filter, collection_override, Some(true))
            .await?;

        if results
            .results
            .first()
            .is_some_and(|top| top.score > EARLY_EXIT_SCORE)
        {
            info!(
                score = results.results[0].score,
                "early exit: top result above threshold, skipping reranker"
            );
            results.results.truncate(limit);
            results.reranked = false;
            results.early_exit = true;
            return Ok(results);
        }

        if self.reranker.enabled {
            debug!(candidates = results.results.len(), "reranking");
            results.results = self.reranker.rerank(query, results.results, limit).await;
            results.reranked = true;
        } else {
            results.results.truncate(limit);
            results.reranked = false;
        }
        results.early_exit = false;
        Ok(results)
    }

    /// Hybrid dense + BM25 search fused with RRF.
    pub async fn hybrid_search(
        &self,
        query: &str,
        user_level: u8,
        limit: usize,
        tier_filter: Option<&[TierLevel]>,
        collection_override: Option<&str>,
        apply_filters: Option<bool>,
    ) -> Result<SearchResults> {
        let (embedding, collection_name, client, filter, tier_values) = self
            .prepare_search_context(query, user_level, tier_filter, collection_override, apply_filters)
            .await?;

        let sparse = self.bm25.as_ref().map(|bm25| bm25.generate_query_sparse_vector(query));
        let bm25_enabled = sparse.as_ref().is_some_and(|s| !s.is_empty());

        let raw = client
            .hybrid_search(&embedding, sparse.as_ref(), filter.as_ref(), limit, limit * 3)
            .await?;
        let search_type = raw.search_type.clone();
        let formatted = format_search_results(&raw, &collection_name, None);

        let avg_score = if formatted.is_empty() {
            0.0
        } else {
            formatted.iter().map(|r| r.score).sum::<f64>() / formatted.len() as f64
        };
        self.health_monitor
            .record_query(&collection_name, !formatted.is_empty(), formatted.len(), avg_score);

        Ok(SearchResults {
            query: query.to_string(),
            results: formatted,
            user_level,
            allowed_tiers: tier_values,
            collection_used: Some(collection_name),
            search_type,
            bm25_enabled,
            ..SearchResults::default()
        })
    }

    /// Full hybrid pipeline: BM25 + dense + RRF + reranking.
    pub async fn hybrid_search_with_reranking(
        &self,
        query: &str,
        user_level: u8,
        limit: usize,
        tier_filter: Option<&[TierLevel]>,
        collection_override: Option<&str>,
    ) -> Result<SearchResults> {
        let mut results = self
            .hybrid_search(query, user_level, limit * 3, tier_filter, collection_override, Some(true))
            .await?;

        if results
            .results
            .first()
            .is_some_and(|top| top.score > EARLY_EXIT_SCORE)
        {
            results.results.truncate(limit);
            results.reranked = false;
            results.early_exit = true;
            return Ok(results);
        }

        if self.reranker.enabled {
            results.results = self.reranker.rerank(query, results.results, limit).await;
            results.reranked = true;
        } else {
            results.results.truncate(limit);
            results.reranked = false;
        }
        results.early_exit = false;
        Ok(results)
    }

    /// Multi-collection search with conflict detection and resolution.
    ///
    /// All selected collections are queried concurrently; a failing
    /// collection is logged and dropped, never failing the aggregate.
    pub async fn search_with_conflict_resolution(
        &self,
        query: &str,
        user_level: u8,
        limit: usize,
        tier_filter: Option<&[TierLevel]>,
        enable_fallbacks: bool,
    ) -> Result<SearchResults> {
        Self::validate(query, user_level)?;
        self.multi_collection_searches.fetch_add(1, Ordering::Relaxed);

        // One embedding, reused across every collection.
        let embedding = self.embedder.generate_query_embedding(query).await?;

        let routing = self.router.route_query(query, None, enable_fallbacks);
        let primary = routing.collection_name.clone();
        if routing.is_pricing {
            info!("pricing query routed to single collection: bali_zero_pricing");
        } else {
            info!(
                primary = %primary,
                confidence = routing.confidence,
                total = routing.collections.len(),
                "multi-collection search"
            );
        }

        let searches = routing.collections.iter().map(|name| {
            let name = name.clone();
            let embedding = &embedding;
            let primary = primary.clone();
            async move {
                let Some(client) = self.collection_manager.get_collection(&name).await else {
                    warn!(collection = %name, "collection not found, skipping");
                    return (name, Vec::new());
                };

                let mut allowed = TierLevel::allowed_for_level(user_level);
                if let Some(restriction) = tier_filter {
                    allowed.retain(|t| restriction.contains(t));
                }
                let tier_map = if name == collections::ZANTARA_BOOKS {
                    tier_filter_for(&allowed)
                } else {
                    None
                };
                let filter = build_search_filter(tier_map, true);

                match client.search(embedding, filter.as_ref(), limit, None).await {
                    Ok(raw) => {
                        let formatted = format_search_results(&raw, &name, Some(&primary));
                        (name, formatted)
                    }
                    Err(err) => {
                        error!(collection = %name, "collection search failed: {err}");
                        (name, Vec::new())
                    }
                }
            }
        });

        let outcomes = join_all(searches).await;

        let mut results_by_collection: HashMap<String, Vec<ScoredDoc>> = HashMap::new();
        let mut health_records = Vec::new();
        for (name, formatted) in outcomes {
            if formatted.is_empty() {
                health_records.push(QueryRecord {
                    collection_name: name,
                    had_results: false,
                    result_count: 0,
                    avg_score: 0.0,
                });
                continue;
            }
            let avg_score =
                formatted.iter().map(|r| r.score).sum::<f64>() / formatted.len() as f64;
            info!(
                collection = %name,
                count = formatted.len(),
                top_score = formatted[0].score,
                "collection results"
            );
            health_records.push(QueryRecord {
                collection_name: name.clone(),
                had_results: true,
                result_count: formatted.len(),
                avg_score,
            });
            results_by_collection.insert(name, formatted);
        }
        self.health_monitor.record_queries_batch(&health_records);

        let conflicts = self.conflict_resolver.detect_conflicts(&results_by_collection);
        let conflicts_detected = conflicts.len();
        let (mut merged, conflict_reports) = if conflicts.is_empty() {
            (
                results_by_collection.values().flatten().cloned().collect::<Vec<_>>(),
                Vec::new(),
            )
        } else {
            self.conflict_resolver.resolve_conflicts(&results_by_collection, conflicts)
        };

        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        // Up to 2× limit so losing conflict results stay visible.
        merged.truncate(limit * 2);

        Ok(SearchResults {
            query: query.to_string(),
            results: merged,
            user_level,
            primary_collection: Some(primary),
            collections_searched: results_by_collection.keys().cloned().collect(),
            confidence: routing.confidence,
            conflicts_detected,
            conflicts: conflict_reports,
            fallbacks_used: routing.collections.len() > 1,
            ..SearchResults::default()
        })
    }

    /// Direct passthrough search on a named collection (few-shot lookups).
    pub async fn search_collection(
        &self,
        query: &str,
        collection_name: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<SearchResults> {
        let embedding = self.embedder.generate_query_embedding(query).await?;
        let client = self.collection_manager.get_or_create(collection_name).await;
        let raw = client.search(&embedding, filter, limit, None).await?;
        let formatted = format_search_results(&raw, collection_name, None);

        Ok(SearchResults {
            query: query.to_string(),
            results: formatted,
            collection_used: Some(collection_name.to_string()),
            ..SearchResults::default()
        })
    }

    pub fn get_conflict_stats(&self) -> ConflictStatsReport {
        let stats = self.conflict_resolver.stats();
        let total = self.multi_collection_searches.load(Ordering::Relaxed);
        let conflict_rate = if total > 0 {
            stats.conflicts_detected as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let resolution_rate = if stats.conflicts_detected > 0 {
            stats.conflicts_resolved as f64 / stats.conflicts_detected as f64 * 100.0
        } else {
            0.0
        };
        ConflictStatsReport {
            total_multi_collection_searches: total,
            stats,
            conflict_rate: format!("{conflict_rate:.1}%"),
            resolution_rate: format!("{resolution_rate:.1}%"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictStatsReport {
    pub total_multi_collection_searches: u64,
    #[serde(flatten)]
    pub stats: ConflictStats,
    pub conflict_rate: String,
    pub resolution_rate: String,
}
