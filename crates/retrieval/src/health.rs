//! Per-collection query health metrics for observability.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionHealth {
    pub queries: u64,
    pub queries_with_results: u64,
    pub total_results: u64,
    score_sum: f64,
}

impl CollectionHealth {
    pub fn avg_score(&self) -> f64 {
        if self.queries_with_results > 0 {
            self.score_sum / self.queries_with_results as f64
        } else {
            0.0
        }
    }

    pub fn hit_rate(&self) -> f64 {
        if self.queries > 0 {
            self.queries_with_results as f64 / self.queries as f64
        } else {
            0.0
        }
    }
}

/// One query's health record, used for batch recording.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub collection_name: String,
    pub had_results: bool,
    pub result_count: usize,
    pub avg_score: f64,
}

#[derive(Debug, Default)]
pub struct CollectionHealthService {
    by_collection: Mutex<HashMap<String, CollectionHealth>>,
}

impl CollectionHealthService {
    pub fn record_query(
        &self,
        collection_name: &str,
        had_results: bool,
        result_count: usize,
        avg_score: f64,
    ) {
        let mut map = self.by_collection.lock().expect("health lock poisoned");
        let entry = map.entry(collection_name.to_string()).or_default();
        entry.queries += 1;
        if had_results {
            entry.queries_with_results += 1;
            entry.total_results += result_count as u64;
            entry.score_sum += avg_score;
        }
    }

    /// Batch variant used after parallel multi-collection searches.
    pub fn record_queries_batch(&self, records: &[QueryRecord]) {
        for record in records {
            self.record_query(
                &record.collection_name,
                record.had_results,
                record.result_count,
                record.avg_score,
            );
        }
    }

    pub fn snapshot(&self) -> HashMap<String, CollectionHealth> {
        self.by_collection.lock().expect("health lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_aggregate_per_collection() {
        let health = CollectionHealthService::default();
        health.record_query("visa_oracle", true, 5, 0.8);
        health.record_query("visa_oracle", false, 0, 0.0);
        health.record_query("tax_genius", true, 3, 0.6);

        let snapshot = health.snapshot();
        let visa = &snapshot["visa_oracle"];
        assert_eq!(visa.queries, 2);
        assert_eq!(visa.queries_with_results, 1);
        assert_eq!(visa.total_results, 5);
        assert_eq!(visa.avg_score(), 0.8);
        assert_eq!(visa.hit_rate(), 0.5);
        assert_eq!(snapshot["tax_genius"].queries, 1);
    }

    #[test]
    fn batch_recording_matches_individual() {
        let health = CollectionHealthService::default();
        health.record_queries_batch(&[
            QueryRecord {
                collection_name: "legal_unified".to_string(),
                had_results: true,
                result_count: 2,
                avg_score: 0.7,
            },
            QueryRecord {
                collection_name: "legal_updates".to_string(),
                had_results: false,
                result_count: 0,
                avg_score: 0.0,
            },
        ]);
        let snapshot = health.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["legal_unified"].total_results, 2);
    }

    #[test]
    fn empty_collection_rates_are_zero() {
        let health = CollectionHealth::default();
        assert_eq!(health.avg_score(), 0.0);
        assert_eq!(health.hit_rate(), 0.0);
    }
}
