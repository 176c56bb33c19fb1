//! Web search with a graceful no-op when no search backend is configured:
//! the observation steers the model back to `vector_search`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::error;

use crate::{Tool, ToolArgs, arg_str, arg_usize};

pub struct WebSearchTool {
    http: reqwest::Client,
    /// Search API endpoint; `None` disables the tool.
    endpoint: Option<String>,
    api_key: String,
}

impl WebSearchTool {
    pub fn new(endpoint: Option<String>, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { http, endpoint, api_key }
    }

    pub fn disabled() -> Self {
        Self::new(None, String::new())
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Use this when you need recent updates, news, or information not in the knowledge base."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"},
                "num_results": {"type": "integer", "description": "Number of results (default: 5)"},
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let query = arg_str(args, "query").ok_or_else(|| anyhow::anyhow!("missing 'query' argument"))?;
        let num_results = arg_usize(args, "num_results", 5);

        let Some(endpoint) = &self.endpoint else {
            return Ok(format!(
                "Web search is not available. Please use vector_search tool instead to search \
                 the knowledge base for information about: {query}"
            ));
        };

        let payload = json!({"q": query, "num": num_results});
        let response = match self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!("web search failed: {err}");
                return Ok(format!("Web search failed: {err}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(format!("Web search failed: HTTP {status}"));
        }

        let body: Value = response.json().await.unwrap_or_default();
        let results = body
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        let formatted: Vec<String> = results
            .iter()
            .take(num_results)
            .map(|r| {
                let title = r.get("title").and_then(|t| t.as_str()).unwrap_or("No Title");
                let snippet = r.get("snippet").and_then(|s| s.as_str()).unwrap_or("");
                format!("- {title}: {snippet}")
            })
            .collect();

        if formatted.is_empty() {
            Ok("No web results found.".to_string())
        } else {
            Ok(formatted.join("\n"))
        }
    }
}
