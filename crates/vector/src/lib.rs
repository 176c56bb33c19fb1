//! Vector layer: Qdrant REST client, embeddings generation, BM25 sparse
//! vectors, and process-wide operation metrics.

pub mod bm25;
pub mod embeddings;
pub mod metrics;
pub mod qdrant;

pub use bm25::{Bm25Vectorizer, SparseVector};
pub use embeddings::EmbeddingsGenerator;
pub use metrics::{VectorMetrics, vector_metrics};
pub use qdrant::{
    CollectionStats, FilterCond, QdrantClient, RetrieveResponse, SearchFilter, SearchResponse,
};
