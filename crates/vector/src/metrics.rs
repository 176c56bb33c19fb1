use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for vector store operations.
///
/// Updated by every [`crate::QdrantClient`] call; read by the diagnostics
/// tool and health endpoints.
#[derive(Debug, Default)]
pub struct VectorMetrics {
    pub search_calls: AtomicU64,
    pub search_total_ms: AtomicU64,
    pub upsert_calls: AtomicU64,
    pub upsert_total_ms: AtomicU64,
    pub upsert_documents_total: AtomicU64,
    pub retry_count: AtomicU64,
    pub errors: AtomicU64,
}

impl VectorMetrics {
    pub fn record_search(&self, elapsed_ms: u64) {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        self.search_total_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn record_upsert(&self, elapsed_ms: u64, documents: u64) {
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        self.upsert_total_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.upsert_documents_total
            .fetch_add(documents, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let search_calls = self.search_calls.load(Ordering::Relaxed);
        let upsert_calls = self.upsert_calls.load(Ordering::Relaxed);
        MetricsSnapshot {
            search_calls,
            search_avg_ms: if search_calls > 0 {
                self.search_total_ms.load(Ordering::Relaxed) as f64 / search_calls as f64
            } else {
                0.0
            },
            upsert_calls,
            upsert_avg_ms: if upsert_calls > 0 {
                self.upsert_total_ms.load(Ordering::Relaxed) as f64 / upsert_calls as f64
            } else {
                0.0
            },
            upsert_documents_total: self.upsert_documents_total.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub search_calls: u64,
    pub search_avg_ms: f64,
    pub upsert_calls: u64,
    pub upsert_avg_ms: f64,
    pub upsert_documents_total: u64,
    pub retry_count: u64,
    pub errors: u64,
}

static METRICS: OnceLock<VectorMetrics> = OnceLock::new();

/// Global metrics handle shared by every client in the process.
pub fn vector_metrics() -> &'static VectorMetrics {
    METRICS.get_or_init(VectorMetrics::default)
}
