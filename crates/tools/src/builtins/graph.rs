//! Knowledge-graph traversal and team lookups.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::{PgPool, Row};
use tracing::error;

use zantara_memory::KnowledgeGraphRepository;

use crate::{Tool, ToolArgs, arg_str, arg_usize};

pub struct GraphTraversalTool {
    kg: Option<KnowledgeGraphRepository>,
}

impl GraphTraversalTool {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { kg: pool.map(KnowledgeGraphRepository::new) }
    }
}

#[async_trait]
impl Tool for GraphTraversalTool {
    fn name(&self) -> &str {
        "graph_traversal"
    }

    fn description(&self) -> &str {
        "Explore the knowledge graph: find entities related to a legal/business term and how they connect (laws, topics, visa types, institutions)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity": {"type": "string", "description": "Entity or term to explore"},
                "top_k": {"type": "integer", "description": "Number of entities to return (default: 5)"},
            },
            "required": ["entity"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let entity =
            arg_str(args, "entity").ok_or_else(|| anyhow::anyhow!("missing 'entity' argument"))?;
        let top_k = arg_usize(args, "top_k", 5) as i64;

        let Some(kg) = &self.kg else {
            return Ok("Knowledge graph is not available.".to_string());
        };

        let entities = kg.semantic_search_entities(entity, top_k).await;
        if entities.is_empty() {
            return Ok(format!("No knowledge graph entities matched '{entity}'."));
        }

        let mut out = format!("Entities related to '{entity}':\n");
        for e in entities {
            out.push_str(&format!(
                "- [{}] {} (mentioned {} times, {} source references)\n",
                e["type"].as_str().unwrap_or("?"),
                e["name"].as_str().unwrap_or("?"),
                e["mentions"],
                e["source_mentions"],
            ));
        }
        Ok(out)
    }
}

pub struct TeamKnowledgeTool {
    pool: Option<PgPool>,
}

impl TeamKnowledgeTool {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Tool for TeamKnowledgeTool {
    fn name(&self) -> &str {
        "team_knowledge"
    }

    fn description(&self) -> &str {
        "Look up Bali Zero team members by name, role, or department. Use for questions about who does what inside the company."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Name, role, or department to look up"},
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let query =
            arg_str(args, "query").ok_or_else(|| anyhow::anyhow!("missing 'query' argument"))?;

        let Some(pool) = &self.pool else {
            return Ok("Team directory is not available.".to_string());
        };

        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT full_name, role, department, email
             FROM team_members
             WHERE full_name ILIKE $1 OR role ILIKE $1 OR department ILIKE $1
             ORDER BY full_name
             LIMIT 10",
        )
        .bind(&pattern)
        .fetch_all(pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(err) => {
                error!("team lookup failed: {err}");
                return Ok(format!("Team lookup failed: {err}"));
            }
        };

        if rows.is_empty() {
            return Ok(format!("No team members matched '{query}'."));
        }

        let mut out = String::from("Team members:\n");
        for row in rows {
            out.push_str(&format!(
                "- {} — {} ({})\n",
                row.try_get::<String, _>("full_name").unwrap_or_default(),
                row.try_get::<String, _>("role").unwrap_or_default(),
                row.try_get::<String, _>("department").unwrap_or_default(),
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn graph_tool_degrades_without_pool() {
        let tool = GraphTraversalTool::new(None);
        let args = crate::parser::args_from(&[("entity", json!("KITAS"))]);
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(out, "Knowledge graph is not available.");
    }

    #[tokio::test]
    async fn team_tool_degrades_without_pool() {
        let tool = TeamKnowledgeTool::new(None);
        let args = crate::parser::args_from(&[("query", json!("tax department"))]);
        let out = tool.execute(&args).await.unwrap();
        assert_eq!(out, "Team directory is not available.");
    }
}
