//! Official pricing lookup. The only legitimate source for price answers.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::pricing::PricingService;
use crate::{Tool, ToolArgs, arg_str};

pub struct PricingTool {
    service: PricingService,
}

impl PricingTool {
    pub fn new(service: PricingService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for PricingTool {
    fn name(&self) -> &str {
        "get_pricing"
    }

    fn description(&self) -> &str {
        "Get OFFICIAL Bali Zero pricing for services. ALWAYS use this for price questions. Returns prices for Visa, KITAS, Business Setup, Tax."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "service_type": {
                    "type": "string",
                    "enum": ["visa", "kitas", "business_setup", "tax_consulting", "legal", "all"],
                    "description": "Type of service to get pricing for",
                },
                "query": {
                    "type": "string",
                    "description": "Optional specific search query (e.g. 'investor kitas')",
                },
            },
            "required": ["service_type"],
        })
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String> {
        let service_type = arg_str(args, "service_type").unwrap_or("all");
        match arg_str(args, "query") {
            Some(query) if !query.trim().is_empty() => Ok(self.service.search_service(query)),
            _ => Ok(self.service.get_pricing(service_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn service_type_lookup() {
        let tool = PricingTool::new(PricingService);
        let args = crate::parser::args_from(&[("service_type", json!("kitas"))]);
        let out = tool.execute(&args).await.unwrap();
        assert!(out.contains("OFFICIAL BALI ZERO PRICES"));
        assert!(out.contains("E33G"));
    }

    #[tokio::test]
    async fn query_takes_precedence_over_service_type() {
        let tool = PricingTool::new(PricingService);
        let args = crate::parser::args_from(&[
            ("service_type", json!("visa")),
            ("query", json!("investor kitas")),
        ]);
        let out = tool.execute(&args).await.unwrap();
        assert!(out.contains("E28A"));
    }

    #[tokio::test]
    async fn missing_service_type_defaults_to_all() {
        let tool = PricingTool::new(PricingService);
        let out = tool.execute(&ToolArgs::new()).await.unwrap();
        assert!(out.contains("PT PMA Company Setup"));
    }
}
