//! Cross-collection conflict detection and resolution.
//!
//! Resolution order: temporal priority (an `updates` collection wins over
//! its base counterpart), then top-score relevance. Losing results stay in
//! the merged set with a score penalty so callers can still show them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::collections;
use crate::constants::CONFLICT_PENALTY_MULTIPLIER;
use crate::formatter::ScoredDoc;

/// Collection pairs that commonly disagree. The `updates` pairs resolve by
/// temporal priority. Visa regulations also surface in the general legal
/// corpus, and neither of those two sources is authoritative over the
/// other, so that pair resolves by relevance instead.
const CONFLICT_PAIRS: &[(&str, &str)] = &[
    (collections::TAX_GENIUS, collections::TAX_UPDATES),
    (collections::LEGAL_UNIFIED, collections::LEGAL_UPDATES),
    (collections::VISA_ORACLE, collections::LEGAL_UNIFIED),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub collections: [String; 2],
    pub conflict_type: String,
    pub collection1_results: usize,
    pub collection2_results: usize,
    pub collection1_top_score: f64,
    pub collection2_top_score: f64,
    pub detected_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub winner: String,
    pub loser: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictStats {
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
    pub timestamp_resolutions: u64,
    pub semantic_resolutions: u64,
}

#[derive(Debug, Default)]
pub struct ConflictResolver {
    detected: AtomicU64,
    resolved: AtomicU64,
    timestamp_resolutions: AtomicU64,
    semantic_resolutions: AtomicU64,
}

impl ConflictResolver {
    /// A conflict record is emitted whenever both members of a known pair
    /// returned results for the same query.
    pub fn detect_conflicts(
        &self,
        results_by_collection: &HashMap<String, Vec<ScoredDoc>>,
    ) -> Vec<ConflictReport> {
        let mut conflicts = Vec::new();

        for (coll1, coll2) in CONFLICT_PAIRS {
            let (Some(results1), Some(results2)) = (
                results_by_collection.get(*coll1),
                results_by_collection.get(*coll2),
            ) else {
                continue;
            };
            if results1.is_empty() || results2.is_empty() {
                continue;
            }

            let top1 = results1[0].score;
            let top2 = results2[0].score;
            let mut report = ConflictReport {
                collections: [coll1.to_string(), coll2.to_string()],
                conflict_type: if coll2.contains("updates") {
                    "temporal".to_string()
                } else {
                    "semantic".to_string()
                },
                collection1_results: results1.len(),
                collection2_results: results2.len(),
                collection1_top_score: top1,
                collection2_top_score: top2,
                detected_at: Utc::now().to_rfc3339(),
                timestamp1: None,
                timestamp2: None,
                resolution: None,
            };

            let ts1 = results1[0].metadata_str("timestamp").map(String::from);
            let ts2 = results2[0].metadata_str("timestamp").map(String::from);
            if ts1.is_some() || ts2.is_some() {
                report.timestamp1 = Some(ts1.unwrap_or_else(|| "unknown".to_string()));
                report.timestamp2 = Some(ts2.unwrap_or_else(|| "unknown".to_string()));
            }

            self.detected.fetch_add(1, Ordering::Relaxed);
            warn!(
                collection1 = coll1,
                collection2 = coll2,
                score1 = top1,
                score2 = top2,
                "conflict detected"
            );
            conflicts.push(report);
        }

        conflicts
    }

    /// Resolve the detected conflicts, tagging winners `preferred` and
    /// penalizing losers so they rank below but remain visible.
    pub fn resolve_conflicts(
        &self,
        results_by_collection: &HashMap<String, Vec<ScoredDoc>>,
        conflicts: Vec<ConflictReport>,
    ) -> (Vec<ScoredDoc>, Vec<ConflictReport>) {
        let mut resolved_results = Vec::new();
        let mut reports = Vec::new();

        for mut conflict in conflicts {
            let [coll1, coll2] = conflict.collections.clone();
            let results1 = results_by_collection.get(&coll1).cloned().unwrap_or_default();
            let results2 = results_by_collection.get(&coll2).cloned().unwrap_or_default();

            let (winner_coll, winner, loser_coll, loser, reason) =
                if coll2.contains("updates") && !results2.is_empty() {
                    self.timestamp_resolutions.fetch_add(1, Ordering::Relaxed);
                    (coll2.clone(), results2, coll1.clone(), results1, "temporal_priority (updates collection)")
                } else if coll1.contains("updates") && !results1.is_empty() {
                    self.timestamp_resolutions.fetch_add(1, Ordering::Relaxed);
                    (coll1.clone(), results1, coll2.clone(), results2, "temporal_priority (updates collection)")
                } else {
                    self.semantic_resolutions.fetch_add(1, Ordering::Relaxed);
                    let score1 = results1.first().map(|r| r.score).unwrap_or(0.0);
                    let score2 = results2.first().map(|r| r.score).unwrap_or(0.0);
                    if score2 > score1 {
                        (coll2.clone(), results2, coll1.clone(), results1, "relevance_score")
                    } else {
                        (coll1.clone(), results1, coll2.clone(), results2, "relevance_score")
                    }
                };

            for mut result in winner {
                result.metadata["conflict_resolution"] = json!({
                    "status": "preferred",
                    "reason": reason,
                    "alternate_source": loser_coll,
                });
                resolved_results.push(result);
            }
            for mut result in loser {
                let status = if reason.contains("temporal") { "outdated" } else { "alternate" };
                result.metadata["conflict_resolution"] = json!({
                    "status": status,
                    "reason": reason,
                    "preferred_source": winner_coll,
                });
                result.score = (result.score * CONFLICT_PENALTY_MULTIPLIER * 10_000.0).round() / 10_000.0;
                resolved_results.push(result);
            }

            conflict.resolution = Some(Resolution {
                winner: winner_coll.clone(),
                loser: loser_coll.clone(),
                reason: reason.to_string(),
            });
            self.resolved.fetch_add(1, Ordering::Relaxed);
            info!(winner = %winner_coll, loser = %loser_coll, reason, "conflict resolved");
            reports.push(conflict);
        }

        (resolved_results, reports)
    }

    pub fn stats(&self) -> ConflictStats {
        ConflictStats {
            conflicts_detected: self.detected.load(Ordering::Relaxed),
            conflicts_resolved: self.resolved.load(Ordering::Relaxed),
            timestamp_resolutions: self.timestamp_resolutions.load(Ordering::Relaxed),
            semantic_resolutions: self.semantic_resolutions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(score: f64, timestamp: Option<&str>) -> ScoredDoc {
        let metadata = match timestamp {
            Some(ts) => json!({"timestamp": ts}),
            None => json!({}),
        };
        ScoredDoc { id: None, text: "doc".to_string(), metadata, score }
    }

    fn results_for(pairs: Vec<(&str, Vec<ScoredDoc>)>) -> HashMap<String, Vec<ScoredDoc>> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn no_conflict_without_both_collections() {
        let resolver = ConflictResolver::default();
        let results = results_for(vec![("tax_genius", vec![doc(0.8, None)])]);
        assert!(resolver.detect_conflicts(&results).is_empty());
    }

    #[test]
    fn conflict_detected_for_known_pair() {
        let resolver = ConflictResolver::default();
        let results = results_for(vec![
            ("tax_genius", vec![doc(0.8, Some("2024-01-01"))]),
            ("tax_updates", vec![doc(0.7, Some("2025-06-01"))]),
        ]);
        let conflicts = resolver.detect_conflicts(&results);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, "temporal");
        assert_eq!(conflicts[0].timestamp1.as_deref(), Some("2024-01-01"));
        assert_eq!(resolver.stats().conflicts_detected, 1);
    }

    #[test]
    fn updates_collection_wins_even_with_lower_score() {
        let resolver = ConflictResolver::default();
        let results = results_for(vec![
            ("tax_genius", vec![doc(0.95, None)]),
            ("tax_updates", vec![doc(0.6, None)]),
        ]);
        let conflicts = resolver.detect_conflicts(&results);
        let (resolved, reports) = resolver.resolve_conflicts(&results, conflicts);

        let resolution = reports[0].resolution.as_ref().unwrap();
        assert_eq!(resolution.winner, "tax_updates");
        assert!(resolution.reason.contains("temporal_priority"));

        let winner = resolved
            .iter()
            .find(|d| d.metadata["conflict_resolution"]["status"] == "preferred")
            .unwrap();
        assert_eq!(winner.score, 0.6);
        let loser = resolved
            .iter()
            .find(|d| d.metadata["conflict_resolution"]["status"] == "outdated")
            .unwrap();
        assert_eq!(loser.score, 0.76);
        assert_eq!(resolver.stats().timestamp_resolutions, 1);
    }

    #[test]
    fn loser_penalty_keeps_it_below_winner_after_sort() {
        let resolver = ConflictResolver::default();
        let results = results_for(vec![
            ("tax_genius", vec![doc(0.7, None)]),
            ("tax_updates", vec![doc(0.7, None)]),
        ]);
        let conflicts = resolver.detect_conflicts(&results);
        let (mut resolved, _) = resolver.resolve_conflicts(&results, conflicts);
        resolved.sort_by(|a, b| b.score.total_cmp(&a.score));
        assert_eq!(
            resolved[0].metadata["conflict_resolution"]["status"],
            "preferred"
        );
    }

    /// The visa/legal pair is the one real pair with no `updates` side:
    /// the router's visa chain searches both collections, so this is the
    /// path that exercises relevance resolution in production.
    #[test]
    fn visa_legal_overlap_resolves_by_relevance() {
        let resolver = ConflictResolver::default();
        let results = results_for(vec![
            ("visa_oracle", vec![doc(0.5, None)]),
            ("legal_unified", vec![doc(0.9, None)]),
        ]);
        let conflicts = resolver.detect_conflicts(&results);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, "semantic");

        let (resolved, reports) = resolver.resolve_conflicts(&results, conflicts);
        let resolution = reports[0].resolution.as_ref().unwrap();
        assert_eq!(resolution.winner, "legal_unified");
        assert_eq!(resolution.reason, "relevance_score");

        // Non-temporal losers are tagged alternate, not outdated.
        let loser = resolved
            .iter()
            .find(|d| d.metadata["conflict_resolution"]["status"] == "alternate")
            .unwrap();
        assert_eq!(loser.score, 0.4);
        assert_eq!(resolver.stats().semantic_resolutions, 1);
    }
}
