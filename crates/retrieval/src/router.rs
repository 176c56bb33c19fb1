//! Query → collection routing with confidence and fallback chains.

use tracing::debug;

use crate::collections::*;

/// Routing outcome: primary collection plus the ordered list actually
/// searched (primary first).
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub collection_name: String,
    pub collections: Vec<String>,
    pub confidence: f32,
    pub is_pricing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryRouter;

const PRICING_KEYWORDS: &[&str] = &[
    "price", "pricing", "cost", "how much", "quanto costa", "berapa", "harga", "fee", "tariff",
    "quote", "prezzo",
];

const TEAM_KEYWORDS: &[&str] = &[
    "team", "tim", "who is", "chi è", "siapa", "ceo", "founder", "staff", "member", "anggota",
    "bali zero team", "director", "direttore", "manager",
];

const VISA_KEYWORDS: &[&str] = &[
    "visa", "kitas", "kitap", "voa", "immigration", "imigrasi", "stay permit", "e33g", "e28a",
    "e31a", "sponsor", "overstay", "extension", "perpanjang",
];

const TAX_KEYWORDS: &[&str] = &[
    "tax", "pajak", "pph", "ppn", "vat", "npwp", "fiscal", "withholding", "tassa", "tasse",
];

const KBLI_KEYWORDS: &[&str] = &[
    "kbli", "business classification", "company registration", "pt pma", "pt local", "oss",
    "nib", "siup", "business setup", "incorporation",
];

const LEGAL_KEYWORDS: &[&str] = &[
    "law", "legal", "regulation", "undang", "peraturan", "pasal", "hukum", "civil code",
    "manpower", "criminal", "notaris", "akta", "contract", "litigation", "court", "lawsuit",
];

const CULTURAL_KEYWORDS: &[&str] = &[
    "culture", "cultural", "adat", "ceremony", "tradition", "etiquette", "galungan", "nyepi",
];

impl QueryRouter {
    /// Classify a query into a primary collection and optional fallbacks.
    ///
    /// Pricing and team queries are single-source: their collections carry
    /// authoritative data and must never be diluted by fallbacks.
    pub fn route_query(
        &self,
        query: &str,
        collection_override: Option<&str>,
        enable_fallbacks: bool,
    ) -> RoutingDecision {
        if let Some(collection) = collection_override {
            return RoutingDecision {
                collection_name: collection.to_string(),
                collections: vec![collection.to_string()],
                confidence: 1.0,
                is_pricing: collection == BALI_ZERO_PRICING,
            };
        }

        let query_lower = query.to_lowercase();
        let contains_any = |keywords: &[&str]| keywords.iter().any(|kw| query_lower.contains(kw));

        let (primary, fallbacks, confidence, is_pricing) = if contains_any(PRICING_KEYWORDS) {
            (BALI_ZERO_PRICING, vec![], 0.95, true)
        } else if contains_any(TEAM_KEYWORDS) {
            (BALI_ZERO_TEAM, vec![], 0.9, false)
        } else if contains_any(VISA_KEYWORDS) {
            (VISA_ORACLE, vec![LEGAL_UNIFIED], 0.85, false)
        } else if contains_any(TAX_KEYWORDS) {
            (TAX_GENIUS, vec![TAX_UPDATES, LEGAL_UNIFIED], 0.85, false)
        } else if contains_any(KBLI_KEYWORDS) {
            (KBLI_UNIFIED, vec![LEGAL_UNIFIED], 0.8, false)
        } else if contains_any(CULTURAL_KEYWORDS) {
            (CULTURAL_INSIGHTS, vec![], 0.75, false)
        } else if contains_any(LEGAL_KEYWORDS) {
            (LEGAL_UNIFIED, vec![LEGAL_UPDATES], 0.8, false)
        } else {
            (LEGAL_UNIFIED, vec![VISA_ORACLE, TAX_GENIUS], 0.4, false)
        };

        let mut all = vec![primary.to_string()];
        if enable_fallbacks && !is_pricing && primary != BALI_ZERO_TEAM {
            all.extend(fallbacks.iter().map(|c| c.to_string()));
        }

        debug!(
            primary,
            confidence,
            fallbacks = all.len() - 1,
            "routed query"
        );
        RoutingDecision {
            collection_name: primary.to_string(),
            collections: all,
            confidence,
            is_pricing,
        }
    }
}
