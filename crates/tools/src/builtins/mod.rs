//! Built-in tools, one behavior each, all behind the uniform [`crate::Tool`]
//! surface.

pub mod admin;
pub mod calculator;
pub mod database_query;
pub mod get_pricing;
pub mod graph;
pub mod vector_search;
pub mod vision;
pub mod web_search;

pub use admin::{DiagnosticsTool, McpSuperTool, is_admin};
pub use calculator::CalculatorTool;
pub use database_query::DatabaseQueryTool;
pub use get_pricing::PricingTool;
pub use graph::{GraphTraversalTool, TeamKnowledgeTool};
pub use vector_search::{Retriever, VectorSearchTool};
pub use vision::VisionTool;
pub use web_search::WebSearchTool;

use std::sync::Arc;

use sqlx::PgPool;

use zantara_llm::LlmGateway;
use zantara_retrieval::SearchService;

use crate::pricing::PricingService;
use crate::ToolRegistry;

/// The standard registry: every tool the reasoning engine may call.
pub fn default_registry(
    search: Arc<SearchService>,
    gateway: Arc<LlmGateway>,
    pool: Option<PgPool>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(Arc::new(VectorSearchTool::new(search.clone())));
    registry.register(Arc::new(DatabaseQueryTool::new(pool.clone())));
    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(VisionTool::new(gateway.clone())));
    registry.register(Arc::new(PricingTool::new(PricingService)));
    registry.register(Arc::new(WebSearchTool::disabled()));
    registry.register(Arc::new(GraphTraversalTool::new(pool.clone())));
    registry.register(Arc::new(TeamKnowledgeTool::new(pool)));
    registry.register(Arc::new(DiagnosticsTool::new(search.clone(), gateway)));
    registry.register(Arc::new(McpSuperTool::new(search)));
    registry
}
