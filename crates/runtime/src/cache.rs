//! Semantic cache over query results. Exact-match semantics: the key is a
//! hash of the normalized query; the stored embedding keeps the write
//! interface stable for a later true-semantic upgrade.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::result::QueryResult;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CAPACITY: usize = 512;

struct CacheEntry {
    #[allow(dead_code)]
    embedding: Vec<f32>,
    result: QueryResult,
    cached_at: Instant,
}

pub struct SemanticCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for SemanticCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl SemanticCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self { entries: Mutex::new(LruCache::new(capacity)), ttl }
    }

    fn key(query: &str) -> String {
        let normalized = query.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Stale entries are evicted on read; there is no background sweeper.
    pub fn get_cached_result(&self, query: &str) -> Option<QueryResult> {
        let key = Self::key(query);
        let mut entries = self.entries.lock().expect("semantic cache lock poisoned");
        match entries.get(&key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                debug!("semantic cache hit");
                Some(entry.result.clone())
            }
            Some(_) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn cache_result(&self, query: &str, embedding: Vec<f32>, result: QueryResult) {
        let key = Self::key(query);
        self.entries
            .lock()
            .expect("semantic cache lock poisoned")
            .put(key, CacheEntry { embedding, result, cached_at: Instant::now() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_answer(answer: &str) -> QueryResult {
        QueryResult { answer: answer.to_string(), ..QueryResult::default() }
    }

    #[test]
    fn exact_match_hits() {
        let cache = SemanticCache::default();
        cache.cache_result("What is KITAS?", vec![0.0; 384], result_with_answer("a permit"));

        let hit = cache.get_cached_result("What is KITAS?").unwrap();
        assert_eq!(hit.answer, "a permit");
        // Normalization: case and surrounding whitespace do not miss.
        assert!(cache.get_cached_result("  what is kitas?  ").is_some());
    }

    #[test]
    fn different_queries_miss() {
        let cache = SemanticCache::default();
        cache.cache_result("query one", vec![], result_with_answer("one"));
        assert!(cache.get_cached_result("query two").is_none());
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache = SemanticCache::new(8, Duration::from_millis(0));
        cache.cache_result("q", vec![], result_with_answer("a"));
        assert!(cache.get_cached_result("q").is_none());
    }

    #[test]
    fn cached_answers_are_byte_identical() {
        let cache = SemanticCache::default();
        cache.cache_result("idempotent", vec![], result_with_answer("exact bytes ≠ approximation"));
        let first = cache.get_cached_result("idempotent").unwrap();
        let second = cache.get_cached_result("idempotent").unwrap();
        assert_eq!(first.answer.as_bytes(), second.answer.as_bytes());
    }
}
