//! Visual document analysis: inline the file into a multimodal model call
//! and answer a question about it.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::error;

use zantara_llm::LlmGateway;

use crate::{Tool, ToolArgs, arg_str};

pub struct VisionTool {
    gateway: Arc<LlmGateway>,
}

impl VisionTool {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }
}

fn mime_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()?.to_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

#[async_trait]
impl Tool for VisionTool {
    fn name(&self) -> &str {
        "vision_analysis"
    }

    fn description(&self) -> &str {
        "Analyze visual elements in documents (PDFs, images). Use this to extract data from tables, charts, or understand complex layouts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to analyze (PDF or Image)",
                },
                "query": {
                    "type": "string",
                    "description": "Specific question about the visual content",
                },
            },
            "required": ["file_path", "query"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let file_path = arg_str(args, "file_path")
            .ok_or_else(|| anyhow::anyhow!("missing 'file_path' argument"))?;
        let query =
            arg_str(args, "query").ok_or_else(|| anyhow::anyhow!("missing 'query' argument"))?;

        let path = Path::new(file_path);
        let Some(mime) = mime_for(path) else {
            anyhow::bail!("unsupported file type: {file_path}");
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("cannot read {file_path}: {e}"))?;

        match self.gateway.describe_image(query, mime, &bytes).await {
            Ok(answer) => Ok(format!(
                "Vision Analysis Result:\n{answer}\n\nVisual Elements Used: 1"
            )),
            Err(err) => {
                error!("vision analysis failed: {err}");
                anyhow::bail!("vision analysis failed: {err}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zantara_config::AppConfig;

    fn tool() -> VisionTool {
        VisionTool::new(Arc::new(LlmGateway::from_config(&AppConfig::default())))
    }

    #[tokio::test]
    async fn missing_file_is_an_error_observation() {
        let args = crate::parser::args_from(&[
            ("file_path", json!("/nonexistent/scan.png")),
            ("query", json!("what is the total?")),
        ]);
        let err = tool().execute(&args).await.unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let args = crate::parser::args_from(&[
            ("file_path", json!("/tmp/data.xlsx")),
            ("query", json!("totals?")),
        ]);
        let err = tool().execute(&args).await.unwrap_err();
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[test]
    fn mime_detection_covers_the_supported_set() {
        assert_eq!(mime_for(Path::new("a.png")), Some("image/png"));
        assert_eq!(mime_for(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for(Path::new("a.pdf")), Some("application/pdf"));
        assert_eq!(mime_for(Path::new("a.docx")), None);
        assert_eq!(mime_for(Path::new("noext")), None);
    }
}
