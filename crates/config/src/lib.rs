use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration failure that must abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential in production: {0}")]
    MissingCredential(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub google_api_key: String,
    pub openrouter_api_key: String,
    pub model_pro: String,
    pub model_flash: String,
    pub model_flash_lite: String,
    pub openrouter_model: String,
    pub timeout_secs: u64,
    /// Streaming generation calls get a wider budget than plain calls.
    pub stream_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            openrouter_api_key: String::new(),
            model_pro: "gemini-2.5-pro".to_string(),
            model_flash: "gemini-2.0-flash".to_string(),
            model_flash_lite: "gemini-2.0-flash-lite".to_string(),
            openrouter_model: "openai/gpt-4o-mini".to_string(),
            timeout_secs: 30,
            stream_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// "openai" (remote, 1536 dims) or "local" (384 dims).
    pub provider: String,
    pub openai_api_key: String,
    pub model: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            openai_api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enable_bm25: bool,
    pub bm25_vocab_size: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub enable_reranker: bool,
    pub reranker_url: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enable_bm25: true,
            bm25_vocab_size: 30_000,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            enable_reranker: false,
            reranker_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Soft cap on stored facts per user; oldest are evicted past this.
    pub max_facts_per_user: i64,
    pub summary_max_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_facts_per_user: 50,
            summary_max_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub environment: Environment,
    pub qdrant: QdrantConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build a config purely from environment variables (no file on disk).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("ZANTARA_ENV") {
            if value.eq_ignore_ascii_case("production") {
                self.environment = Environment::Production;
            }
        }
        if let Ok(value) = env::var("QDRANT_URL") {
            if !value.is_empty() {
                self.qdrant.url = value;
            }
        }
        if let Ok(value) = env::var("QDRANT_API_KEY") {
            self.qdrant.api_key = value;
        }
        if let Ok(value) = env::var("GOOGLE_API_KEY") {
            self.llm.google_api_key = value;
        }
        if let Ok(value) = env::var("OPENROUTER_API_KEY") {
            self.llm.openrouter_api_key = value;
        }
        if let Ok(value) = env::var("OPENAI_API_KEY") {
            self.embeddings.openai_api_key = value;
        }
        if let Ok(value) = env::var("DATABASE_URL") {
            if !value.is_empty() {
                self.database.url = value;
            }
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Refuse to serve when production lacks the credentials the remote
    /// providers require. Development runs degraded instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_production() {
            return Ok(());
        }
        if self.llm.google_api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("llm.google_api_key"));
        }
        if self.embeddings.provider.eq_ignore_ascii_case("openai")
            && self.embeddings.openai_api_key.trim().is_empty()
        {
            return Err(ConfigError::MissingCredential("embeddings.openai_api_key"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_development_with_local_embeddings() {
        let config = AppConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.embeddings.provider, "local");
        assert_eq!(config.qdrant.url, "http://localhost:6333");
        assert_eq!(config.llm.model_flash, "gemini-2.0-flash");
    }

    #[test]
    fn validate_passes_in_development_without_credentials() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_production_without_gemini_key() {
        let mut config = AppConfig::default();
        config.environment = Environment::Production;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(_)));
    }

    #[test]
    fn validate_rejects_production_remote_embeddings_without_key() {
        let mut config = AppConfig::default();
        config.environment = Environment::Production;
        config.llm.google_api_key = "key".to_string();
        config.embeddings.provider = "openai".to_string();
        assert!(config.validate().is_err());

        config.embeddings.openai_api_key = "key".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn roundtrip_through_toml() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("zantara.toml");

        let mut config = AppConfig::default();
        config.retrieval.enable_reranker = true;
        config.retrieval.reranker_url = "http://localhost:9000".to_string();
        config.save_to(&path)?;

        let loaded = AppConfig::load_from(&path)?;
        assert!(loaded.retrieval.enable_reranker);
        assert_eq!(loaded.retrieval.reranker_url, "http://localhost:9000");
        Ok(())
    }

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let loaded = AppConfig::load_from(dir.path().join("nope.toml"))?;
        assert_eq!(loaded.memory.max_facts_per_user, 50);
        Ok(())
    }
}
