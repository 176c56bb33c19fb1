//! Intent classification: which model tier serves this query, and does it
//! need the deep-think instruction block.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAi {
    Fast,
    Pro,
    DeepThink,
}

#[derive(Debug, Clone, Serialize)]
pub struct Intent {
    pub category: String,
    pub suggested_ai: SuggestedAi,
    pub deep_think_mode: bool,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify_intent(&self, query: &str) -> Intent;
}

/// Keyword heuristics tuned on production traffic: strategic comparisons go
/// deep, detailed legal analysis goes pro, everything else stays fast.
#[derive(Debug, Clone, Default)]
pub struct KeywordIntentClassifier;

const DEEP_THINK_MARKERS: &[&str] = &[
    "compare", "comparison", "pros and cons", "should i", "strategy", "strategic", "versus",
    " vs ", "trade-off", "tradeoff", "analyze my options", "best structure", "meglio",
    "conviene", "which is better",
];

const PRO_MARKERS: &[&str] = &[
    "explain in detail", "detailed", "step by step", "legal analysis", "contract", "draft",
    "implications", "consequences", "liability", "comprehensive", "analisi", "dettagli",
];

const IDENTITY_MARKERS: &[&str] = &[
    "who am i", "do you remember me", "remember me", "chi sono io", "ti ricordi", "about me",
    "my profile", "siapa saya",
];

const TEAM_MARKERS: &[&str] = &[
    "team", "colleague", "who is the", "who works", "chi è il", "staff", "department",
];

const PRICING_MARKERS: &[&str] =
    &["price", "cost", "how much", "quanto costa", "berapa", "harga", "pricing", "fee"];

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify_intent(&self, query: &str) -> Intent {
        let query_lower = query.to_lowercase();
        let contains = |markers: &[&str]| markers.iter().any(|m| query_lower.contains(m));

        if contains(IDENTITY_MARKERS) {
            return Intent {
                category: "identity".to_string(),
                suggested_ai: SuggestedAi::Fast,
                deep_think_mode: false,
            };
        }
        if contains(TEAM_MARKERS) {
            return Intent {
                category: "team_query".to_string(),
                suggested_ai: SuggestedAi::Fast,
                deep_think_mode: false,
            };
        }
        if contains(DEEP_THINK_MARKERS) {
            return Intent {
                category: "strategic".to_string(),
                suggested_ai: SuggestedAi::DeepThink,
                deep_think_mode: true,
            };
        }
        if contains(PRO_MARKERS) || query.len() > 300 {
            return Intent {
                category: "detailed".to_string(),
                suggested_ai: SuggestedAi::Pro,
                deep_think_mode: false,
            };
        }
        let category = if contains(PRICING_MARKERS) { "pricing" } else { "business" };
        Intent {
            category: category.to_string(),
            suggested_ai: SuggestedAi::Fast,
            deep_think_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn classify(query: &str) -> Intent {
        KeywordIntentClassifier.classify_intent(query).await
    }

    #[tokio::test]
    async fn strategic_queries_get_deep_think() {
        let intent = classify("Should I set up a PT PMA or buy an existing company?").await;
        assert_eq!(intent.suggested_ai, SuggestedAi::DeepThink);
        assert!(intent.deep_think_mode);
    }

    #[tokio::test]
    async fn detailed_queries_get_pro() {
        let intent = classify("Explain in detail the tax implications of dividends").await;
        assert_eq!(intent.suggested_ai, SuggestedAi::Pro);
        assert!(!intent.deep_think_mode);
    }

    #[tokio::test]
    async fn pricing_queries_stay_fast() {
        let intent = classify("How much for an E33G KITAS?").await;
        assert_eq!(intent.suggested_ai, SuggestedAi::Fast);
        assert_eq!(intent.category, "pricing");
    }

    #[tokio::test]
    async fn identity_queries_are_tagged() {
        let intent = classify("Do you remember me?").await;
        assert_eq!(intent.category, "identity");
    }

    #[tokio::test]
    async fn team_queries_are_tagged() {
        let intent = classify("Who is the tax department manager?").await;
        assert_eq!(intent.category, "team_query");
    }
}
