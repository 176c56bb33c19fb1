//! Retrieval service: collection routing, filtered semantic search, hybrid
//! dense+sparse fusion, reranking, and cross-collection conflict resolution.

pub mod conflict;
pub mod filters;
pub mod formatter;
pub mod health;
pub mod reranker;
pub mod router;
pub mod service;
pub mod warmup;

pub use conflict::{ConflictReport, ConflictResolver};
pub use filters::{TierLevel, build_search_filter};
pub use formatter::{ScoredDoc, format_search_results};
pub use health::CollectionHealthService;
pub use reranker::ReRanker;
pub use router::{QueryRouter, RoutingDecision};
pub use service::{CollectionManager, SearchResults, SearchService, ValidationError};
pub use warmup::{CollectionWarmupService, WarmupReport};

/// Collections the router understands.
pub mod collections {
    pub const LEGAL_UNIFIED: &str = "legal_unified";
    pub const LEGAL_UPDATES: &str = "legal_updates";
    pub const VISA_ORACLE: &str = "visa_oracle";
    pub const TAX_GENIUS: &str = "tax_genius";
    pub const TAX_UPDATES: &str = "tax_updates";
    pub const KBLI_UNIFIED: &str = "kbli_unified";
    pub const LITIGATION_ORACLE: &str = "litigation_oracle";
    pub const BALI_ZERO_PRICING: &str = "bali_zero_pricing";
    pub const BALI_ZERO_TEAM: &str = "bali_zero_team";
    pub const CULTURAL_INSIGHTS: &str = "cultural_insights";
    pub const ZANTARA_MEMORIES: &str = "zantara_memories";
    pub const ZANTARA_BOOKS: &str = "zantara_books";

    pub const ALL: &[&str] = &[
        LEGAL_UNIFIED,
        LEGAL_UPDATES,
        VISA_ORACLE,
        TAX_GENIUS,
        TAX_UPDATES,
        KBLI_UNIFIED,
        LITIGATION_ORACLE,
        BALI_ZERO_PRICING,
        BALI_ZERO_TEAM,
        CULTURAL_INSIGHTS,
        ZANTARA_MEMORIES,
        ZANTARA_BOOKS,
    ];
}

/// Scoring constants shared by the formatter and conflict resolver.
pub mod constants {
    /// Scores are capped below 1.0 so boosts keep relative ordering.
    pub const MAX_SCORE: f64 = 0.99;
    pub const PRIMARY_COLLECTION_BOOST: f64 = 1.2;
    pub const PRICING_SCORE_BOOST: f64 = 0.15;
    /// Conflict losers stay visible but rank below winners.
    pub const CONFLICT_PENALTY_MULTIPLIER: f64 = 0.8;
    /// Reranking is skipped when the top result is already this confident.
    pub const EARLY_EXIT_SCORE: f64 = 0.9;
}
