//! Deep-dive database queries: full document text by title or id, and
//! knowledge-graph relationships for a term.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::{PgPool, Row};
use tracing::error;

use zantara_memory::KnowledgeGraphRepository;

use crate::{Tool, ToolArgs, arg_str};

/// Full documents are capped to keep one observation from flooding the
/// model's window; the summary column is preferred when present.
const DEEP_DIVE_MAX_CHARS: usize = 10_000;

pub struct DatabaseQueryTool {
    pool: Option<PgPool>,
    kg: Option<KnowledgeGraphRepository>,
}

impl DatabaseQueryTool {
    pub fn new(pool: Option<PgPool>) -> Self {
        let kg = pool.clone().map(KnowledgeGraphRepository::new);
        Self { pool, kg }
    }
}

#[async_trait]
impl Tool for DatabaseQueryTool {
    fn name(&self) -> &str {
        "database_query"
    }

    fn description(&self) -> &str {
        "Query the database to retrieve full document text (Deep Dive) or entity relationships. Use 'by_id' with the ID from vector_search results to read the complete document."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_term": {
                    "type": "string",
                    "description": "The term to search for (e.g., document title) OR the document ID (if query_type='by_id')",
                },
                "query_type": {
                    "type": "string",
                    "enum": ["full_text", "relationship", "by_id"],
                    "description": "Type of query: 'full_text' (title search), 'relationship' (KG), 'by_id' (exact ID match)",
                },
            },
            "required": ["search_term"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let search_term = arg_str(args, "search_term")
            .or_else(|| arg_str(args, "entity_name"))
            .ok_or_else(|| anyhow::anyhow!("missing 'search_term' argument"))?;
        let query_type = arg_str(args, "query_type").unwrap_or("full_text");

        let Some(pool) = &self.pool else {
            return Ok("Database connection not available.".to_string());
        };

        let result = match query_type {
            "full_text" => self.full_text(pool, search_term).await,
            "by_id" => self.by_id(pool, search_term).await,
            "relationship" => return Ok(self.relationships(search_term).await),
            other => return Ok(format!("Unknown query_type: {other}")),
        };

        match result {
            Ok(text) => Ok(text),
            Err(err) => {
                error!("database query failed: {err}");
                Ok(format!("Database query failed: {err}"))
            }
        }
    }
}

impl DatabaseQueryTool {
    async fn full_text(&self, pool: &PgPool, search_term: &str) -> Result<String> {
        let pattern = format!("%{search_term}%");
        let row = sqlx::query(
            "SELECT title, full_text FROM parent_documents WHERE title ILIKE $1 LIMIT 1",
        )
        .bind(&pattern)
        .fetch_optional(pool)
        .await?;

        Ok(match row {
            Some(row) => {
                let title: String = row.get("title");
                let full_text: String = row.get("full_text");
                format!("Document Found: {title}\n\nContent:\n{full_text}")
            }
            None => format!("No full text document found matching '{search_term}'."),
        })
    }

    async fn by_id(&self, pool: &PgPool, search_term: &str) -> Result<String> {
        let row = sqlx::query(
            "SELECT title, full_text, document_id, summary
             FROM parent_documents
             WHERE document_id = $1 OR id::text = $1
             LIMIT 1",
        )
        .bind(search_term)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(format!("No document found with ID '{search_term}'."));
        };

        let title: String = row.get("title");
        let doc_id: Option<String> = row.try_get("document_id").ok();
        let summary = row.try_get::<Option<String>, _>("summary").ok().flatten();
        let full_text: String = row.get("full_text");

        let was_truncated = full_text.chars().count() > DEEP_DIVE_MAX_CHARS;
        let body: String = full_text.chars().take(DEEP_DIVE_MAX_CHARS).collect();

        let mut response = format!(
            "=== FULL DOCUMENT (Deep Dive) ===\nID: {}\nTitle: {title}\n\n",
            doc_id.unwrap_or_else(|| search_term.to_string())
        );
        if let Some(summary) = summary.filter(|s| !s.is_empty()) {
            response.push_str(&format!("SUMMARY:\n{summary}\n\n"));
        }
        response.push_str(&format!("CONTENT:\n{body}"));
        if was_truncated {
            response.push_str(&format!(
                "\n\n[Note: Content truncated to {DEEP_DIVE_MAX_CHARS} characters for performance. Full document available in database.]"
            ));
        }
        response.push_str("\n===============================");
        Ok(response)
    }

    async fn relationships(&self, search_term: &str) -> String {
        let Some(kg) = &self.kg else {
            return "Database connection not available.".to_string();
        };
        let entities = kg.get_entity_context_for_query(search_term, 5).await;
        if entities.is_empty() {
            return format!("No knowledge graph entities found for '{search_term}'.");
        }

        let mut out = format!("Knowledge graph entities related to '{search_term}':\n");
        for entity in entities {
            let relationships = entity["relationships"]
                .as_array()
                .map(|r| {
                    r.iter()
                        .filter_map(|v| v.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            out.push_str(&format!(
                "- [{}] {} (mentions: {}{})\n",
                entity["type"].as_str().unwrap_or("?"),
                entity["name"].as_str().unwrap_or("?"),
                entity["mentions"],
                if relationships.is_empty() {
                    String::new()
                } else {
                    format!("; relationships: {relationships}")
                }
            ));
        }
        out
    }
}
