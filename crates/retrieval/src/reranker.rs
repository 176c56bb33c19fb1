//! Cross-encoder reranker client. Disabled by config flag; failures fall
//! back to the original ordering so reranking never loses results.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, warn};

use zantara_config::AppConfig;

use crate::formatter::ScoredDoc;

#[derive(Debug, Clone)]
pub struct ReRanker {
    http: reqwest::Client,
    pub enabled: bool,
    pub api_url: String,
}

impl ReRanker {
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            http,
            enabled: config.retrieval.enable_reranker && !config.retrieval.reranker_url.is_empty(),
            api_url: config.retrieval.reranker_url.clone(),
        }
    }

    /// Re-order candidates by cross-encoder relevance, keeping `top_k`.
    pub async fn rerank(&self, query: &str, docs: Vec<ScoredDoc>, top_k: usize) -> Vec<ScoredDoc> {
        if !self.enabled || docs.is_empty() {
            return docs.into_iter().take(top_k).collect();
        }

        let documents: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        let payload = json!({"query": query, "documents": documents, "top_k": top_k});

        let response = match self.http.post(&self.api_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "reranker rejected request, keeping original order");
                return docs.into_iter().take(top_k).collect();
            }
            Err(err) => {
                warn!("reranker unavailable, keeping original order: {err}");
                return docs.into_iter().take(top_k).collect();
            }
        };

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!("reranker returned malformed body: {err}");
                return docs.into_iter().take(top_k).collect();
            }
        };

        let Some(ranked) = body.get("results").and_then(|r| r.as_array()) else {
            return docs.into_iter().take(top_k).collect();
        };

        let mut reranked = Vec::with_capacity(top_k);
        for item in ranked.iter().take(top_k) {
            let Some(index) = item.get("index").and_then(|i| i.as_u64()).map(|i| i as usize)
            else {
                continue;
            };
            if let Some(doc) = docs.get(index) {
                let mut doc = doc.clone();
                if let Some(score) = item.get("relevance_score").and_then(|s| s.as_f64()) {
                    doc.score = (score * 10_000.0).round() / 10_000.0;
                }
                reranked.push(doc);
            }
        }

        if reranked.is_empty() {
            return docs.into_iter().take(top_k).collect();
        }
        debug!(candidates = docs.len(), kept = reranked.len(), "reranked");
        reranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(text: &str, score: f64) -> ScoredDoc {
        ScoredDoc { id: None, text: text.to_string(), metadata: json!({}), score }
    }

    #[tokio::test]
    async fn disabled_reranker_truncates_in_place() {
        let reranker = ReRanker::from_config(&AppConfig::default());
        assert!(!reranker.enabled);
        let docs = vec![doc("a", 0.9), doc("b", 0.8), doc("c", 0.7)];
        let out = reranker.rerank("query", docs, 2).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "a");
    }

    #[tokio::test]
    async fn unreachable_reranker_keeps_original_order() {
        let mut config = AppConfig::default();
        config.retrieval.enable_reranker = true;
        config.retrieval.reranker_url = "http://127.0.0.1:1/rerank".to_string();
        let reranker = ReRanker::from_config(&config);
        assert!(reranker.enabled);
        let docs = vec![doc("a", 0.9), doc("b", 0.8)];
        let out = reranker.rerank("query", docs, 2).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "a");
    }
}
