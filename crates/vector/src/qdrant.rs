use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bm25::SparseVector;
use crate::metrics::vector_metrics;

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const UPSERT_BATCH_SIZE: usize = 500;

/// One condition on a payload metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCond {
    Eq(Value),
    In(Vec<Value>),
    Ne(Value),
    Nin(Vec<Value>),
}

/// Simplified metadata filter, field → condition. Converted to the vector
/// store's `{must, must_not}` format at request time.
pub type SearchFilter = BTreeMap<String, FilterCond>;

/// Search results in the layout the retrieval service consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Value>,
    pub distances: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scores: Vec<f64>,
    pub total_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrieveResponse {
    pub ids: Vec<String>,
    pub embeddings: Vec<Option<Vec<f32>>>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub collection_name: String,
    pub total_documents: u64,
    pub vector_size: u64,
    pub distance: String,
    pub status: String,
}

/// Async Qdrant client over the REST interface with connection pooling.
///
/// Transient 5xx/connect failures retry with exponential backoff; 4xx
/// responses return empty results rather than raising, so a single bad
/// collection never takes down a multi-collection search.
#[derive(Debug, Clone)]
pub struct QdrantClient {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

impl QdrantClient {
    pub fn new(base_url: &str, collection: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default();

        let client = Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        };
        debug!(collection, url = %client.base_url, "qdrant client initialized");
        client
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Dense similarity search. Distances are cosine (0 = identical).
    ///
    /// When the collection uses named vectors and no `vector_name` was
    /// given, the client transparently retries with the default dense name.
    pub async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&SearchFilter>,
        limit: usize,
        vector_name: Option<&str>,
    ) -> Result<SearchResponse> {
        if embedding.is_empty() {
            anyhow::bail!("query embedding cannot be empty");
        }

        let started = Instant::now();
        let result = retry_with_backoff(|| self.do_search(embedding, filter, limit, vector_name)).await;
        match result {
            Ok(response) => {
                vector_metrics().record_search(started.elapsed().as_millis() as u64);
                Ok(response)
            }
            Err(err) => {
                vector_metrics().record_error();
                error!(collection = %self.collection, %err, "search failed after retries");
                Ok(SearchResponse::default())
            }
        }
    }

    async fn do_search(
        &self,
        embedding: &[f32],
        filter: Option<&SearchFilter>,
        limit: usize,
        vector_name: Option<&str>,
    ) -> Result<SearchResponse> {
        let mut payload = match vector_name {
            Some(name) => json!({
                "vector": {"name": name, "vector": embedding},
                "limit": limit,
                "with_payload": true,
            }),
            None => json!({
                "vector": embedding,
                "limit": limit,
                "with_payload": true,
            }),
        };
        if let Some(qdrant_filter) = filter.and_then(convert_filter) {
            payload["filter"] = qdrant_filter;
        }

        let response = self
            .request(self.http.post(self.url("/points/search")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response.json().await?;
            return Ok(parse_point_list(body.get("result"), None));
        }

        let body_text = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(anyhow!("qdrant server error {status}: {body_text}"));
        }

        // Collections with named vectors reject the bare-vector layout;
        // retry once with the default dense name.
        if status.as_u16() == 400
            && body_text.contains("Vector params for")
            && vector_name.is_none()
        {
            info!(collection = %self.collection, "collection uses named vectors, retrying with 'dense'");
            return Box::pin(self.do_search(embedding, filter, limit, Some("dense"))).await;
        }

        warn!(collection = %self.collection, %status, "search rejected: {body_text}");
        Ok(SearchResponse::default())
    }

    /// Hybrid dense + BM25 search fused with reciprocal rank fusion.
    ///
    /// Falls back to dense-only search when no sparse vector is available
    /// or the collection has no sparse index.
    pub async fn hybrid_search(
        &self,
        embedding: &[f32],
        sparse: Option<&SparseVector>,
        filter: Option<&SearchFilter>,
        limit: usize,
        prefetch_limit: usize,
    ) -> Result<SearchResponse> {
        let Some(sparse) = sparse.filter(|s| !s.is_empty()) else {
            let mut dense = self.search(embedding, filter, limit, None).await?;
            dense.search_type = Some("dense_only".to_string());
            return Ok(dense);
        };

        let started = Instant::now();
        let result = retry_with_backoff(|| {
            self.do_hybrid_search(embedding, sparse, filter, limit, prefetch_limit)
        })
        .await;

        match result {
            Ok(Some(response)) => {
                vector_metrics().record_search(started.elapsed().as_millis() as u64);
                Ok(response)
            }
            // Sparse vectors not supported by this collection.
            Ok(None) => {
                let mut dense = self.search(embedding, filter, limit, None).await?;
                dense.search_type = Some("dense_only".to_string());
                Ok(dense)
            }
            Err(err) => {
                vector_metrics().record_error();
                error!(collection = %self.collection, %err, "hybrid search failed, falling back to dense");
                let mut dense = self.search(embedding, filter, limit, None).await?;
                dense.search_type = Some("dense_only".to_string());
                Ok(dense)
            }
        }
    }

    async fn do_hybrid_search(
        &self,
        embedding: &[f32],
        sparse: &SparseVector,
        filter: Option<&SearchFilter>,
        limit: usize,
        prefetch_limit: usize,
    ) -> Result<Option<SearchResponse>> {
        let mut payload = json!({
            "prefetch": [
                {"query": embedding, "using": "dense", "limit": prefetch_limit},
                {
                    "query": {"indices": sparse.indices, "values": sparse.values},
                    "using": "bm25",
                    "limit": prefetch_limit,
                },
            ],
            "query": {"fusion": "rrf"},
            "limit": limit,
            "with_payload": true,
        });
        if let Some(qdrant_filter) = filter.and_then(convert_filter) {
            payload["filter"] = qdrant_filter;
        }

        let response = self
            .request(self.http.post(self.url("/points/query")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response.json().await?;
            let points = body.get("result").and_then(|r| r.get("points"));
            let mut parsed = parse_point_list(points, Some("hybrid_rrf"));
            parsed.scores = parsed.distances.iter().map(|d| 1.0 - d).collect();
            debug!(
                collection = %self.collection,
                found = parsed.total_found,
                "hybrid search fused with rrf"
            );
            return Ok(Some(parsed));
        }

        let body_text = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(anyhow!("qdrant server error {status}: {body_text}"));
        }
        if status.as_u16() == 400 && body_text.to_lowercase().contains("sparse") {
            warn!(collection = %self.collection, "no sparse vectors on collection, dense fallback");
            return Ok(None);
        }
        warn!(collection = %self.collection, %status, "hybrid search rejected: {body_text}");
        Ok(Some(SearchResponse {
            search_type: Some("hybrid_rrf".to_string()),
            ..SearchResponse::default()
        }))
    }

    /// Insert or update documents, batched to avoid oversized requests.
    pub async fn upsert_documents(
        &self,
        chunks: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Value],
        ids: Option<Vec<String>>,
    ) -> Result<usize> {
        let ids = ids.unwrap_or_else(|| (0..chunks.len()).map(|_| Uuid::new_v4().to_string()).collect());
        if chunks.len() != embeddings.len() || chunks.len() != metadatas.len() || chunks.len() != ids.len()
        {
            anyhow::bail!("chunks, embeddings, metadatas, and ids must have the same length");
        }

        let started = Instant::now();
        let mut total_added = 0;
        for start in (0..chunks.len()).step_by(UPSERT_BATCH_SIZE) {
            let end = (start + UPSERT_BATCH_SIZE).min(chunks.len());
            let points: Vec<Value> = (start..end)
                .map(|i| {
                    json!({
                        "id": ids[i],
                        "vector": embeddings[i],
                        "payload": {"text": chunks[i], "metadata": metadatas[i]},
                    })
                })
                .collect();
            self.put_points(points).await?;
            total_added += end - start;
            info!(
                collection = %self.collection,
                batch = start / UPSERT_BATCH_SIZE + 1,
                added = end - start,
                "upserted batch"
            );
        }

        vector_metrics().record_upsert(started.elapsed().as_millis() as u64, total_added as u64);
        Ok(total_added)
    }

    /// Upsert with co-indexed dense and BM25 named vectors.
    pub async fn upsert_documents_with_sparse(
        &self,
        chunks: &[String],
        embeddings: &[Vec<f32>],
        sparse_vectors: &[SparseVector],
        metadatas: &[Value],
        ids: Option<Vec<String>>,
    ) -> Result<usize> {
        let ids = ids.unwrap_or_else(|| (0..chunks.len()).map(|_| Uuid::new_v4().to_string()).collect());
        if chunks.len() != embeddings.len()
            || chunks.len() != sparse_vectors.len()
            || chunks.len() != metadatas.len()
            || chunks.len() != ids.len()
        {
            anyhow::bail!("chunks, embeddings, sparse_vectors, metadatas, and ids must have the same length");
        }

        let started = Instant::now();
        let mut total_added = 0;
        for start in (0..chunks.len()).step_by(UPSERT_BATCH_SIZE) {
            let end = (start + UPSERT_BATCH_SIZE).min(chunks.len());
            let points: Vec<Value> = (start..end)
                .map(|i| {
                    json!({
                        "id": ids[i],
                        "vector": {
                            "dense": embeddings[i],
                            "bm25": {
                                "indices": sparse_vectors[i].indices,
                                "values": sparse_vectors[i].values,
                            },
                        },
                        "payload": {"text": chunks[i], "metadata": metadatas[i]},
                    })
                })
                .collect();
            self.put_points(points).await?;
            total_added += end - start;
        }

        vector_metrics().record_upsert(started.elapsed().as_millis() as u64, total_added as u64);
        Ok(total_added)
    }

    async fn put_points(&self, points: Vec<Value>) -> Result<()> {
        let response = self
            .request(self.http.put(self.url("/points")))
            .query(&[("wait", "true")])
            .json(&json!({"points": points}))
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("qdrant upsert failed ({status}): {body}");
        }
        Ok(())
    }

    /// Retrieve points by id.
    pub async fn get(&self, ids: &[String], include_vectors: bool) -> Result<RetrieveResponse> {
        let response = self
            .request(self.http.post(self.url("/points")))
            .query(&[("with_payload", "true"), ("with_vectors", if include_vectors { "true" } else { "false" })])
            .json(&json!({"ids": ids}))
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            warn!(collection = %self.collection, %status, "get rejected");
            return Ok(RetrieveResponse::default());
        }

        let body: Value = response.json().await?;
        let mut out = RetrieveResponse::default();
        if let Some(points) = body.get("result").and_then(|r| r.as_array()) {
            for point in points {
                out.ids.push(point_id(point));
                out.embeddings.push(
                    point
                        .get("vector")
                        .and_then(|v| v.as_array())
                        .map(|floats| floats.iter().filter_map(|f| f.as_f64()).map(|f| f as f32).collect()),
                );
                let payload = point.get("payload").cloned().unwrap_or_default();
                out.documents.push(
                    payload
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_string(),
                );
                out.metadatas
                    .push(payload.get("metadata").cloned().unwrap_or_else(|| json!({})));
            }
        }
        Ok(out)
    }

    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        let response = self
            .request(self.http.post(self.url("/points/delete")))
            .query(&[("wait", "true")])
            .json(&json!({"points": ids}))
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("qdrant delete failed ({status}): {body}");
        }
        info!(collection = %self.collection, count = ids.len(), "deleted points");
        Ok(ids.len())
    }

    /// Sample points without a query vector (scroll).
    pub async fn peek(&self, limit: usize) -> Result<SearchResponse> {
        let response = self
            .request(self.http.post(self.url("/points/scroll")))
            .json(&json!({"limit": limit, "with_payload": true, "with_vectors": false}))
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            warn!(collection = %self.collection, %status, "peek rejected");
            return Ok(SearchResponse::default());
        }
        let body: Value = response.json().await?;
        let points = body.get("result").and_then(|r| r.get("points"));
        Ok(parse_point_list(points, None))
    }

    pub async fn create_collection(
        &self,
        vector_size: usize,
        distance: &str,
        enable_sparse: bool,
    ) -> Result<bool> {
        let payload = if enable_sparse {
            json!({
                "vectors": {"dense": {"size": vector_size, "distance": distance}},
                "sparse_vectors": {"bm25": {"index": {"on_disk": false}}},
            })
        } else {
            json!({"vectors": {"size": vector_size, "distance": distance}})
        };

        let response = self
            .request(self.http.put(self.url("")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;
        let ok = response.status().is_success();
        if ok {
            info!(collection = %self.collection, enable_sparse, "created collection");
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(collection = %self.collection, "failed to create collection: {body}");
        }
        Ok(ok)
    }

    pub async fn get_collection_stats(&self) -> Result<CollectionStats> {
        let response = self
            .request(self.http.get(self.url("")))
            .send()
            .await
            .map_err(|e| anyhow!("qdrant connection error: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("failed to get collection stats: HTTP {status}");
        }
        let body: Value = response.json().await?;
        let result = body.get("result").cloned().unwrap_or_default();
        let vectors = result
            .pointer("/config/params/vectors")
            .cloned()
            .unwrap_or_default();

        Ok(CollectionStats {
            collection_name: self.collection.clone(),
            total_documents: result.get("points_count").and_then(|v| v.as_u64()).unwrap_or(0),
            vector_size: vectors.get("size").and_then(|v| v.as_u64()).unwrap_or(1536),
            distance: vectors
                .get("distance")
                .and_then(|v| v.as_str())
                .unwrap_or("Cosine")
                .to_string(),
            status: result
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        })
    }
}

/// Convert the simplified filter map to the `{must, must_not}` wire format.
pub fn convert_filter(filter: &SearchFilter) -> Option<Value> {
    if filter.is_empty() {
        return None;
    }

    let mut must = Vec::new();
    let mut must_not = Vec::new();
    for (field, cond) in filter {
        let key = format!("metadata.{field}");
        match cond {
            FilterCond::Eq(value) => must.push(json!({"key": key, "match": {"value": value}})),
            FilterCond::In(values) => {
                if !values.is_empty() {
                    must.push(json!({"key": key, "match": {"any": values}}));
                }
            }
            FilterCond::Ne(value) => must_not.push(json!({"key": key, "match": {"value": value}})),
            FilterCond::Nin(values) => {
                for value in values {
                    must_not.push(json!({"key": key, "match": {"value": value}}));
                }
            }
        }
    }

    let mut result = serde_json::Map::new();
    if !must.is_empty() {
        result.insert("must".to_string(), Value::Array(must));
    }
    if !must_not.is_empty() {
        result.insert("must_not".to_string(), Value::Array(must_not));
    }
    if result.is_empty() { None } else { Some(Value::Object(result)) }
}

fn point_id(point: &Value) -> String {
    match point.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn parse_point_list(points: Option<&Value>, search_type: Option<&str>) -> SearchResponse {
    let mut out = SearchResponse {
        search_type: search_type.map(ToString::to_string),
        ..SearchResponse::default()
    };
    let Some(points) = points.and_then(|p| p.as_array()) else {
        return out;
    };
    for point in points {
        out.ids.push(point_id(point));
        let payload = point.get("payload").cloned().unwrap_or_default();
        out.documents.push(
            payload
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
        );
        out.metadatas
            .push(payload.get("metadata").cloned().unwrap_or_else(|| json!({})));
        let score = point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
        out.distances.push(1.0 - score);
    }
    out.total_found = out.ids.len();
    out
}

async fn retry_with_backoff<T, F, Fut>(mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..=MAX_RETRIES {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_err = Some(err);
                if attempt < MAX_RETRIES {
                    let delay = RETRY_BASE_DELAY * 2_u32.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        "retrying after {delay:?}: {}",
                        last_err.as_ref().map(|e| e.to_string()).unwrap_or_default()
                    );
                    vector_metrics().record_retry();
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("retry exhausted")))
}
