//! Admin-gated operational tools. The authenticated user id arrives via
//! the injected `_user_id` argument, never from model-chosen input.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use zantara_llm::LlmGateway;
use zantara_retrieval::SearchService;
use zantara_vector::vector_metrics;

use crate::{Tool, ToolArgs, arg_str};

/// Internal operators: company-domain accounts plus the system's creator.
pub fn is_admin(user_id: &str) -> bool {
    let lower = user_id.to_lowercase();
    lower.ends_with("@balizero.com") || lower.contains("antonello") || lower.contains("siano")
}

fn gate(args: &ToolArgs) -> Option<String> {
    match arg_str(args, "_user_id") {
        Some(user) if is_admin(user) => None,
        _ => Some("Access denied: this operation is restricted to the internal team.".to_string()),
    }
}

pub struct DiagnosticsTool {
    search: Arc<SearchService>,
    gateway: Arc<LlmGateway>,
}

impl DiagnosticsTool {
    pub fn new(search: Arc<SearchService>, gateway: Arc<LlmGateway>) -> Self {
        Self { search, gateway }
    }
}

#[async_trait]
impl Tool for DiagnosticsTool {
    fn name(&self) -> &str {
        "diagnostics"
    }

    fn description(&self) -> &str {
        "Internal: report collection health, vector store metrics, and model availability. Team only."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_models": {
                    "type": "boolean",
                    "description": "Also ping every model tier (slow)",
                },
            },
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        if let Some(denied) = gate(args) {
            return Ok(denied);
        }

        let mut out = String::from("SYSTEM DIAGNOSTICS\n\nCollection health:\n");
        let health = self.search.health_monitor.snapshot();
        if health.is_empty() {
            out.push_str("- no queries recorded yet\n");
        }
        let mut names: Vec<&String> = health.keys().collect();
        names.sort();
        for name in names {
            let entry = &health[name];
            out.push_str(&format!(
                "- {name}: {} queries, hit rate {:.0}%, avg score {:.3}\n",
                entry.queries,
                entry.hit_rate() * 100.0,
                entry.avg_score(),
            ));
        }

        let metrics = vector_metrics().snapshot();
        out.push_str(&format!(
            "\nVector store: {} searches (avg {:.1}ms), {} upserts, {} retries, {} errors\n",
            metrics.search_calls,
            metrics.search_avg_ms,
            metrics.upsert_calls,
            metrics.retry_count,
            metrics.errors,
        ));

        let conflict = self.search.get_conflict_stats();
        out.push_str(&format!(
            "Conflict resolution: {} multi-collection searches, rate {}, resolved {}\n",
            conflict.total_multi_collection_searches, conflict.conflict_rate, conflict.resolution_rate,
        ));

        if args.get("include_models").and_then(|v| v.as_bool()).unwrap_or(false) {
            out.push_str("\nModel availability:\n");
            let mut entries: Vec<(String, bool)> =
                self.gateway.health_check().await.into_iter().collect();
            entries.sort();
            for (model, healthy) in entries {
                out.push_str(&format!("- {model}: {}\n", if healthy { "ok" } else { "down" }));
            }
        }

        Ok(out)
    }
}

pub struct McpSuperTool {
    search: Arc<SearchService>,
}

impl McpSuperTool {
    pub fn new(search: Arc<SearchService>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for McpSuperTool {
    fn name(&self) -> &str {
        "mcp_super"
    }

    fn description(&self) -> &str {
        "Internal: multi-operation admin surface (collection stats, sample documents). Team only."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["collection_stats", "peek"],
                    "description": "Admin operation to run",
                },
                "collection": {"type": "string", "description": "Target collection"},
            },
            "required": ["operation", "collection"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        if let Some(denied) = gate(args) {
            return Ok(denied);
        }

        let operation = arg_str(args, "operation")
            .ok_or_else(|| anyhow::anyhow!("missing 'operation' argument"))?;
        let collection = arg_str(args, "collection")
            .ok_or_else(|| anyhow::anyhow!("missing 'collection' argument"))?;

        let client = self.search.collection_manager.get_or_create(collection).await;
        match operation {
            "collection_stats" => {
                let stats = client.get_collection_stats().await?;
                Ok(format!(
                    "Collection '{}': {} documents, vector size {}, distance {}, status {}",
                    stats.collection_name,
                    stats.total_documents,
                    stats.vector_size,
                    stats.distance,
                    stats.status,
                ))
            }
            "peek" => {
                let sample = client.peek(3).await?;
                if sample.ids.is_empty() {
                    return Ok(format!("Collection '{collection}' returned no sample points."));
                }
                let mut out = format!("Sample from '{collection}':\n");
                for (id, doc) in sample.ids.iter().zip(sample.documents.iter()) {
                    let snippet: String = doc.chars().take(120).collect();
                    out.push_str(&format!("- {id}: {snippet}\n"));
                }
                Ok(out)
            }
            other => Ok(format!("Unknown operation: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zantara_config::AppConfig;
    use zantara_vector::EmbeddingsGenerator;

    #[test]
    fn admin_detection() {
        assert!(is_admin("amanda@balizero.com"));
        assert!(is_admin("antonello@example.com"));
        assert!(!is_admin("marco@example.com"));
        assert!(!is_admin("anonymous"));
    }

    fn diagnostics() -> DiagnosticsTool {
        let config = AppConfig::default();
        DiagnosticsTool::new(
            Arc::new(SearchService::new(&config, EmbeddingsGenerator::local())),
            Arc::new(LlmGateway::from_config(&config)),
        )
    }

    #[tokio::test]
    async fn non_admin_is_denied() {
        let tool = diagnostics();
        let args = crate::parser::args_from(&[("_user_id", json!("marco@example.com"))]);
        let out = tool.execute(&args).await.unwrap();
        assert!(out.starts_with("Access denied"));
    }

    #[tokio::test]
    async fn anonymous_is_denied() {
        let tool = diagnostics();
        let out = tool.execute(&ToolArgs::new()).await.unwrap();
        assert!(out.starts_with("Access denied"));
    }

    #[tokio::test]
    async fn admin_gets_metrics_without_model_pings() {
        let tool = diagnostics();
        let args = crate::parser::args_from(&[("_user_id", json!("ops@balizero.com"))]);
        let out = tool.execute(&args).await.unwrap();
        assert!(out.contains("SYSTEM DIAGNOSTICS"));
        assert!(out.contains("Vector store:"));
        assert!(!out.contains("Model availability"));
    }
}
