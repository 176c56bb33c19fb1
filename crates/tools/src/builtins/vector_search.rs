//! Knowledge-base search with collection routing. Returns a structured
//! JSON envelope so the reasoning engine can split the observation text
//! from the citation sources.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use zantara_retrieval::{SearchResults, SearchService};

use crate::{Tool, ToolArgs, arg_str, arg_usize};

/// Snippet cap keeps observations inside the model's working window.
const SNIPPET_MAX_CHARS: usize = 800;

/// Seam over the retrieval service so the tool can be exercised with a
/// scripted retriever in tests.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search_with_reranking(
        &self,
        query: &str,
        user_level: u8,
        limit: usize,
        collection_override: Option<&str>,
    ) -> Result<SearchResults>;
}

#[async_trait]
impl Retriever for SearchService {
    async fn search_with_reranking(
        &self,
        query: &str,
        user_level: u8,
        limit: usize,
        collection_override: Option<&str>,
    ) -> Result<SearchResults> {
        SearchService::search_with_reranking(self, query, user_level, limit, None, collection_override)
            .await
    }
}

pub struct VectorSearchTool {
    retriever: Arc<dyn Retriever>,
}

impl VectorSearchTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn name(&self) -> &str {
        "vector_search"
    }

    fn description(&self) -> &str {
        "Search the legal document knowledge base. IMPORTANT: You MUST specify the 'collection' parameter based on the topic:\n\
         - 'tax_genius' for Taxes, VAT, PPh, Finance.\n\
         - 'visa_oracle' for Visas, Immigration, Stay Permits.\n\
         - 'kbli_unified' for Business Classification (KBLI).\n\
         - 'legal_unified' for General Law, Civil Code, Manpower, Criminal Law."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query in natural language"},
                "collection": {
                    "type": "string",
                    "enum": [
                        "legal_unified",
                        "visa_oracle",
                        "tax_genius",
                        "kbli_unified",
                        "litigation_oracle",
                    ],
                    "description": "Specific collection to search. Use 'kbli_unified' for PT PMA, business setup, KBLI codes, company registration.",
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5)",
                },
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let query = arg_str(args, "query").ok_or_else(|| anyhow::anyhow!("missing 'query' argument"))?;
        let collection = arg_str(args, "collection");
        let top_k = arg_usize(args, "top_k", 5);

        // Standard access for agent-initiated searches.
        let results = self
            .retriever
            .search_with_reranking(query, 1, top_k, collection)
            .await?;
        let chunks = results.results;

        if chunks.is_empty() {
            return Ok(json!({"content": "No relevant documents found.", "sources": []}).to_string());
        }

        let mut formatted_texts = Vec::with_capacity(chunks.len());
        let mut sources = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let metadata = &chunk.metadata;
            let title = metadata
                .get("title")
                .and_then(|t| t.as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("Document {}", i + 1));
            let url = metadata
                .get("url")
                .or_else(|| metadata.get("source_url"))
                .and_then(|u| u.as_str())
                .unwrap_or_default();
            // Chapter ids from the hierarchical indexer take priority for
            // deep-dive lookups, then document ids, then raw point ids.
            let doc_id = metadata
                .get("chapter_id")
                .or_else(|| metadata.get("document_id"))
                .or_else(|| metadata.get("id"))
                .and_then(|d| d.as_str())
                .map(String::from)
                .or_else(|| chunk.id.clone())
                .unwrap_or_default();

            let snippet: String = chunk.text.chars().take(SNIPPET_MAX_CHARS).collect();
            formatted_texts.push(format!("[{}] ID: {} | Title: {}\n{}", i + 1, doc_id, title, snippet));

            sources.push(json!({
                "id": i + 1,
                "title": title,
                "url": url,
                "score": chunk.score,
                "category": metadata
                    .get("category")
                    .and_then(|c| c.as_str())
                    .unwrap_or(collection.unwrap_or("general")),
                "doc_id": doc_id,
            }));
        }

        Ok(json!({
            "content": formatted_texts.join("\n\n"),
            "sources": sources,
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zantara_retrieval::ScoredDoc;

    struct ScriptedRetriever {
        docs: Vec<ScoredDoc>,
    }

    #[async_trait]
    impl Retriever for ScriptedRetriever {
        async fn search_with_reranking(
            &self,
            query: &str,
            _user_level: u8,
            limit: usize,
            _collection_override: Option<&str>,
        ) -> Result<SearchResults> {
            Ok(SearchResults {
                query: query.to_string(),
                results: self.docs.iter().take(limit).cloned().collect(),
                ..SearchResults::default()
            })
        }
    }

    fn tool_with(docs: Vec<ScoredDoc>) -> VectorSearchTool {
        VectorSearchTool::new(Arc::new(ScriptedRetriever { docs }))
    }

    #[tokio::test]
    async fn empty_results_produce_no_documents_sentinel() {
        let tool = tool_with(vec![]);
        let args = crate::parser::args_from(&[("query", json!("anything"))]);
        let out = tool.execute(&args).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["content"], "No relevant documents found.");
        assert_eq!(parsed["sources"], json!([]));
    }

    #[tokio::test]
    async fn results_carry_sources_and_numbered_snippets() {
        let tool = tool_with(vec![ScoredDoc {
            id: Some("point-1".to_string()),
            text: "KITAS E33G costs apply per year.".to_string(),
            metadata: json!({
                "title": "Digital Nomad KITAS",
                "url": "https://example.com/e33g",
                "document_id": "doc-e33g",
                "category": "visa",
            }),
            score: 0.91,
        }]);
        let args = crate::parser::args_from(&[
            ("query", json!("e33g cost")),
            ("collection", json!("visa_oracle")),
        ]);
        let out = tool.execute(&args).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();

        assert!(parsed["content"].as_str().unwrap().starts_with("[1] ID: doc-e33g | Title: Digital Nomad KITAS"));
        let source = &parsed["sources"][0];
        assert_eq!(source["id"], 1);
        assert_eq!(source["title"], "Digital Nomad KITAS");
        assert_eq!(source["score"], 0.91);
        assert_eq!(source["doc_id"], "doc-e33g");
    }

    #[tokio::test]
    async fn long_documents_are_snipped() {
        let tool = tool_with(vec![ScoredDoc {
            id: None,
            text: "x".repeat(2000),
            metadata: json!({}),
            score: 0.5,
        }]);
        let args = crate::parser::args_from(&[("query", json!("q"))]);
        let out = tool.execute(&args).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let content = parsed["content"].as_str().unwrap();
        assert!(content.len() < 1000);
    }

    #[tokio::test]
    async fn missing_query_is_an_error() {
        let tool = tool_with(vec![]);
        assert!(tool.execute(&ToolArgs::new()).await.is_err());
    }
}
