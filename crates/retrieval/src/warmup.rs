//! Collection warmup: pre-load priority collections at startup so the
//! first real query skips the cold-start penalty. Partial failures are
//! tolerated and warmup never blocks readiness.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use zantara_vector::EmbeddingsGenerator;

use crate::collections;
use crate::service::CollectionManager;

/// Priority order follows production query frequency: pricing first, then
/// visa, then tax.
const PRIORITY_COLLECTIONS: &[&str] = &[
    collections::BALI_ZERO_PRICING,
    collections::VISA_ORACLE,
    collections::TAX_GENIUS,
];

#[derive(Debug, Clone, Serialize)]
pub struct WarmupReport {
    pub success: bool,
    pub elapsed_secs: f64,
    pub collections_warmed: Vec<String>,
    pub collections_failed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CollectionWarmupService;

impl CollectionWarmupService {
    /// One lightweight 1-result search to pull a collection's index hot.
    pub async fn warmup_collection(
        &self,
        manager: &CollectionManager,
        embedder: &EmbeddingsGenerator,
        collection_name: &str,
    ) -> bool {
        let Some(client) = manager.get_collection(collection_name).await else {
            warn!(collection = collection_name, "warmup: collection not found");
            return false;
        };

        let embedding = match embedder.generate_query_embedding("test").await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(collection = collection_name, "warmup embedding failed: {err}");
                return false;
            }
        };

        match client.search(&embedding, None, 1, None).await {
            Ok(_) => {
                info!(collection = collection_name, "warmed up");
                true
            }
            Err(err) => {
                warn!(collection = collection_name, "warmup failed: {err}");
                false
            }
        }
    }

    /// Warm the embedding model and every priority collection in order.
    pub async fn warmup_all_collections(
        &self,
        manager: &CollectionManager,
        embedder: &EmbeddingsGenerator,
    ) -> WarmupReport {
        let started = Instant::now();
        info!("starting collection warmup");

        // One throwaway embedding loads the model before any collection.
        if let Err(err) = embedder
            .generate_query_embedding("What is KITAS visa Indonesia pricing?")
            .await
        {
            warn!("embedding model warmup failed: {err}");
        }

        let mut warmed = Vec::new();
        let mut failed = Vec::new();
        for collection in PRIORITY_COLLECTIONS {
            if self.warmup_collection(manager, embedder, collection).await {
                warmed.push(collection.to_string());
            } else {
                failed.push(collection.to_string());
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            warmed = warmed.len(),
            failed = failed.len(),
            elapsed_secs = elapsed,
            "collection warmup completed"
        );

        WarmupReport {
            success: failed.is_empty(),
            elapsed_secs: (elapsed * 100.0).round() / 100.0,
            collections_warmed: warmed,
            collections_failed: failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zantara_config::AppConfig;

    #[tokio::test]
    async fn unknown_collection_fails_without_panicking() {
        let manager = CollectionManager::from_config(&AppConfig::default());
        let embedder = EmbeddingsGenerator::local();
        let ok = CollectionWarmupService
            .warmup_collection(&manager, &embedder, "missing_collection")
            .await;
        assert!(!ok);
    }
}
