use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sparse vector in the index/value layout Qdrant expects.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// BM25 term-weighting over a hashed vocabulary.
///
/// Tokens hash into a fixed vocabulary space so the vectorizer needs no
/// fitted corpus state; collisions are acceptable at the configured size.
#[derive(Debug, Clone)]
pub struct Bm25Vectorizer {
    vocab_size: usize,
    k1: f32,
    b: f32,
    /// Assumed average document length in tokens, used by the length norm.
    avg_doc_len: f32,
}

impl Bm25Vectorizer {
    pub fn new(vocab_size: usize, k1: f32, b: f32) -> Self {
        Self {
            vocab_size: vocab_size.max(1),
            k1,
            b,
            avg_doc_len: 64.0,
        }
    }

    /// Weight the query terms for hybrid retrieval.
    pub fn generate_query_sparse_vector(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return SparseVector::default();
        }
        let doc_len = tokens.len() as f32;

        // Term frequency per hashed index; BTreeMap keeps output ordering
        // deterministic for identical input.
        let mut tf: BTreeMap<u32, f32> = BTreeMap::new();
        for token in &tokens {
            *tf.entry(self.hash_token(token)).or_insert(0.0) += 1.0;
        }

        let norm = 1.0 - self.b + self.b * (doc_len / self.avg_doc_len);
        let mut indices = Vec::with_capacity(tf.len());
        let mut values = Vec::with_capacity(tf.len());
        for (index, freq) in tf {
            let weight = (freq * (self.k1 + 1.0)) / (freq + self.k1 * norm);
            indices.push(index);
            values.push(weight);
        }

        SparseVector { indices, values }
    }

    fn hash_token(&self, token: &str) -> u32 {
        let digest = Sha256::digest(token.as_bytes());
        let raw = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        raw % self.vocab_size as u32
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_produces_empty_vector() {
        let bm25 = Bm25Vectorizer::new(30_000, 1.5, 0.75);
        assert!(bm25.generate_query_sparse_vector("").is_empty());
        assert!(bm25.generate_query_sparse_vector("a ! ?").is_empty());
    }

    #[test]
    fn identical_queries_hash_identically() {
        let bm25 = Bm25Vectorizer::new(30_000, 1.5, 0.75);
        let a = bm25.generate_query_sparse_vector("KITAS visa requirements");
        let b = bm25.generate_query_sparse_vector("KITAS visa requirements");
        assert_eq!(a, b);
        assert_eq!(a.indices.len(), 3);
    }

    #[test]
    fn repeated_terms_weigh_more_than_single_terms() {
        let bm25 = Bm25Vectorizer::new(30_000, 1.5, 0.75);
        let vector = bm25.generate_query_sparse_vector("pajak pajak pajak visa");
        let max = vector.values.iter().cloned().fold(0.0_f32, f32::max);
        let min = vector.values.iter().cloned().fold(f32::MAX, f32::min);
        assert!(max > min);
    }

    #[test]
    fn indices_stay_within_vocabulary() {
        let bm25 = Bm25Vectorizer::new(100, 1.5, 0.75);
        let vector = bm25.generate_query_sparse_vector("company registration tax permit");
        assert!(vector.indices.iter().all(|&i| i < 100));
    }
}
