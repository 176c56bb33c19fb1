//! Orchestration runtime: the non-streaming and streaming entry points,
//! user context assembly, history compression, intent routing, and the
//! semantic cache.

pub mod cache;
pub mod context;
pub mod context_window;
pub mod events;
pub mod intent;
pub mod orchestrator;
pub mod result;

pub use cache::SemanticCache;
pub use context::{UserContext, get_user_context, search_memory_vector};
pub use context_window::{ContextWindowManager, ProcessedHistory, truncate_history_fallback};
pub use events::StreamEvent;
pub use intent::{Intent, IntentClassifier, KeywordIntentClassifier, SuggestedAi};
pub use orchestrator::{AgenticOrchestrator, OrchestratorError};
pub use result::{QueryResult, StepSummary};

#[cfg(test)]
mod tests;
