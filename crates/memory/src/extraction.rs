//! LLM-backed fact extraction from a finished exchange.

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use zantara_llm::{ChatGateway, ChatSession, ModelTier};

const EXTRACTION_PROMPT: &str = "\
You extract durable facts about the user from one conversation exchange.

Rules:
- Only facts worth remembering across conversations: identity, role, goals,
  preferences, constraints, deadlines, budget, family, business plans.
- No transient chit-chat, no facts about the assistant.
- Each fact is one short sentence in third person.

Return ONLY a JSON array, no prose:
[{\"content\": \"...\", \"fact_type\": \"preference|identity|goal|constraint|other\", \"confidence\": 0.0-1.0}]
Return [] when nothing is worth remembering.";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedFact {
    pub content: String,
    #[serde(default = "default_fact_type")]
    pub fact_type: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_fact_type() -> String {
    "other".to_string()
}

fn default_confidence() -> f64 {
    0.7
}

pub struct FactExtractor {
    gateway: Arc<dyn ChatGateway>,
}

impl FactExtractor {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }

    /// One cheap-tier model call with function calling disabled.
    pub async fn extract(&self, user_message: &str, ai_response: &str) -> Result<Vec<ExtractedFact>> {
        let message = format!("USER: {user_message}\n\nASSISTANT: {ai_response}");
        let mut chat = ChatSession::new("fact-extraction");
        let reply = self
            .gateway
            .send_message(&mut chat, &message, EXTRACTION_PROMPT, ModelTier::Lite, false)
            .await?;

        let facts = parse_facts(&reply.text);
        debug!(count = facts.len(), "facts extracted");
        Ok(facts)
    }
}

/// Lenient parse: find the outermost JSON array in the reply; models often
/// wrap it in prose or a code fence.
pub fn parse_facts(text: &str) -> Vec<ExtractedFact> {
    let Some(start) = text.find('[') else {
        return Vec::new();
    };
    let Some(end) = text.rfind(']') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let candidate = &text[start..=end];
    let parsed: Vec<ExtractedFact> = serde_json::from_str(candidate).unwrap_or_default();
    parsed
        .into_iter()
        .filter(|fact| !fact.content.trim().is_empty())
        .map(|mut fact| {
            fact.confidence = fact.confidence.clamp(0.0, 1.0);
            fact
        })
        .collect()
}
