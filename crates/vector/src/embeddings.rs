use anyhow::{Context, Result};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

use zantara_config::{AppConfig, ConfigError};

const REMOTE_DIMENSIONS: usize = 1536;
const LOCAL_DIMENSIONS: usize = 384;

/// Deterministic text → dense vector generator.
///
/// Two providers: a remote embedding model (1536 dims) and a local hashed
/// projection (384 dims) for development and tests. The dimension is fixed
/// per configured provider.
#[derive(Debug, Clone)]
pub struct EmbeddingsGenerator {
    provider: Provider,
    http: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Remote,
    Local,
}

impl EmbeddingsGenerator {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let provider = if config.embeddings.provider.eq_ignore_ascii_case("openai") {
            Provider::Remote
        } else {
            Provider::Local
        };

        if provider == Provider::Remote
            && config.is_production()
            && config.embeddings.openai_api_key.trim().is_empty()
        {
            return Err(ConfigError::MissingCredential("embeddings.openai_api_key"));
        }

        Ok(Self {
            provider,
            http: reqwest::Client::new(),
            api_key: config.embeddings.openai_api_key.clone(),
            model: config.embeddings.model.clone(),
        })
    }

    /// Local generator, independent of any configuration. Used by tests and
    /// by the semantic cache's placeholder embeddings.
    pub fn local() -> Self {
        Self {
            provider: Provider::Local,
            http: reqwest::Client::new(),
            api_key: String::new(),
            model: String::new(),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            Provider::Remote => "openai",
            Provider::Local => "local",
        }
    }

    pub fn dimensions(&self) -> usize {
        match self.provider {
            Provider::Remote => REMOTE_DIMENSIONS,
            Provider::Local => LOCAL_DIMENSIONS,
        }
    }

    pub async fn generate_query_embedding(&self, text: &str) -> Result<Vec<f32>> {
        match self.provider {
            Provider::Remote => self.remote_embedding(&[text.to_string()]).await.map(|mut v| {
                v.pop().unwrap_or_else(|| vec![0.0; REMOTE_DIMENSIONS])
            }),
            Provider::Local => Ok(local_embedding(text)),
        }
    }

    /// Batch variant used by ingestion paths.
    pub async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.provider {
            Provider::Remote => self.remote_embedding(texts).await,
            Provider::Local => Ok(texts.iter().map(|t| local_embedding(t)).collect()),
        }
    }

    async fn remote_embedding(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            anyhow::bail!("embedding provider error ({status}): {body}");
        }

        let vectors = body
            .get("data")
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        item.get("embedding")
                            .and_then(|e| e.as_array())
                            .map(|floats| {
                                floats
                                    .iter()
                                    .filter_map(|f| f.as_f64())
                                    .map(|f| f as f32)
                                    .collect::<Vec<f32>>()
                            })
                            .unwrap_or_default()
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        debug!(count = vectors.len(), "remote embeddings generated");
        Ok(vectors)
    }
}

/// Hashed feature projection: each token votes into a handful of buckets,
/// the result is L2-normalized. Deterministic for identical input.
fn local_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; LOCAL_DIMENSIONS];
    for token in text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 2)
    {
        let digest = Sha256::digest(token.to_lowercase().as_bytes());
        for chunk in digest.chunks_exact(4).take(4) {
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let index = (raw as usize) % LOCAL_DIMENSIONS;
            let sign = if raw & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
    }

    let magnitude: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut vector {
            *value /= magnitude;
        }
    }
    vector
}
