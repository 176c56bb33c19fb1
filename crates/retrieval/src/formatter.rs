//! Raw vector-store results → scored documents with collection boosts.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use zantara_vector::SearchResponse;

use crate::collections;
use crate::constants::{MAX_SCORE, PRICING_SCORE_BOOST, PRIMARY_COLLECTION_BOOST};

/// One formatted search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub id: Option<String>,
    pub text: String,
    pub metadata: Value,
    pub score: f64,
}

impl ScoredDoc {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Score formatting rules:
/// base `1/(1+distance)`, primary collection ×1.2 (capped 0.99), pricing and
/// team collections +0.15 additive (capped 0.99), rounded to four decimals.
pub fn format_search_results(
    raw: &SearchResponse,
    collection_name: &str,
    primary_collection: Option<&str>,
) -> Vec<ScoredDoc> {
    let mut formatted = Vec::with_capacity(raw.documents.len());

    for i in 0..raw.documents.len() {
        let mut distance = raw.distances.get(i).copied().unwrap_or(1.0);
        if distance < 0.0 {
            distance = 0.0;
        }
        let mut score = 1.0 / (1.0 + distance);

        if let Some(primary) = primary_collection {
            if collection_name == primary {
                score = (score * PRIMARY_COLLECTION_BOOST).min(MAX_SCORE);
            }
        }
        if collection_name == collections::BALI_ZERO_PRICING
            || collection_name == collections::BALI_ZERO_TEAM
        {
            score = (score + PRICING_SCORE_BOOST).min(MAX_SCORE);
        }

        let mut metadata = raw.metadatas.get(i).cloned().unwrap_or_else(|| json!({}));
        if !metadata.is_object() {
            metadata = json!({});
        }
        if let Some(primary) = primary_collection {
            metadata["source_collection"] = json!(collection_name);
            metadata["is_primary"] = json!(collection_name == primary);
        }
        if collection_name == collections::BALI_ZERO_PRICING {
            metadata["pricing_priority"] = json!("high");
        }

        formatted.push(ScoredDoc {
            id: raw.ids.get(i).cloned(),
            text: raw.documents.get(i).cloned().unwrap_or_default(),
            metadata,
            score: (score * 10_000.0).round() / 10_000.0,
        });
    }

    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_distance(distance: f64) -> SearchResponse {
        SearchResponse {
            ids: vec!["doc1".to_string()],
            documents: vec!["KITAS E33G info".to_string()],
            metadatas: vec![json!({"type": "visa"})],
            distances: vec![distance],
            scores: vec![],
            total_found: 1,
            search_type: None,
        }
    }

    #[test]
    fn base_score_is_inverse_distance() {
        let results = format_search_results(&raw_with_distance(0.25), "visa_oracle", None);
        assert_eq!(results[0].score, 0.8);
        assert!(results[0].metadata.get("source_collection").is_none());
    }

    #[test]
    fn primary_collection_gets_multiplicative_boost() {
        let results =
            format_search_results(&raw_with_distance(0.25), "visa_oracle", Some("visa_oracle"));
        assert_eq!(results[0].score, 0.96);
        assert_eq!(results[0].metadata["is_primary"], json!(true));
        assert_eq!(results[0].metadata["source_collection"], json!("visa_oracle"));
    }

    #[test]
    fn pricing_gets_additive_boost_and_priority_flag() {
        let results = format_search_results(&raw_with_distance(0.3), "bali_zero_pricing", None);
        // 1/1.3 + 0.15 rounded to 4 decimals
        assert_eq!(results[0].score, 0.9192);
        assert_eq!(results[0].metadata["pricing_priority"], json!("high"));
    }

    #[test]
    fn team_gets_additive_boost() {
        let results = format_search_results(&raw_with_distance(0.3), "bali_zero_team", None);
        assert_eq!(results[0].score, 0.9192);
    }

    #[test]
    fn score_is_capped() {
        let results = format_search_results(
            &raw_with_distance(0.0),
            "bali_zero_pricing",
            Some("bali_zero_pricing"),
        );
        assert_eq!(results[0].score, MAX_SCORE);
    }

    #[test]
    fn negative_distance_is_clamped() {
        let results = format_search_results(&raw_with_distance(-0.5), "legal_unified", None);
        assert_eq!(results[0].score, 1.0);
    }

    #[test]
    fn empty_results_format_to_empty() {
        let raw = SearchResponse::default();
        assert!(format_search_results(&raw, "legal_unified", None).is_empty());
    }
}
