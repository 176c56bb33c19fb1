//! Agent core: per-request reasoning state, the ReAct loop, and the
//! response pipeline.

pub mod pipeline;
pub mod postprocess;
pub mod reasoning;
pub mod verify;

pub use pipeline::{
    CitationStage, FormatStage, PipelineData, PipelineStage, PostProcessingStage, ResponsePipeline,
    VerificationStage, create_default_pipeline,
};
pub use postprocess::post_process_response;
pub use reasoning::{ReactOutcome, ReasoningEngine, unwrap_vector_search};
pub use verify::{GatewayVerifier, LexicalVerifier, Verification, Verifier};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use zantara_tools::ToolCall;

/// Default ceiling on reasoning turns; the algorithmic timeout of the loop.
pub const DEFAULT_MAX_STEPS: u32 = 5;

/// One citation record. Deduplicated by `(title, url)`, sorted by score
/// descending; `id` is assigned at emit time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Source {
    /// Parse one entry of the vector_search tool's `sources` array.
    pub fn from_tool_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let title = object.get("title").and_then(|t| t.as_str())?.to_string();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            id: object.get("id").and_then(|i| i.as_u64()).unwrap_or(0) as u32,
            title,
            url: object
                .get("url")
                .or_else(|| object.get("source_url"))
                .and_then(|u| u.as_str())
                .unwrap_or_default()
                .to_string(),
            collection: object
                .get("collection")
                .or_else(|| object.get("category"))
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string(),
            score: object.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
            snippet: object
                .get("snippet")
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string(),
            metadata: object.get("metadata").cloned().unwrap_or(Value::Null),
        })
    }
}

/// One turn of the reasoning loop. Immutable once appended.
/// A final step never carries an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub step_number: u32,
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(default)]
    pub is_final: bool,
}

impl AgentStep {
    pub fn thought(step_number: u32, thought: impl Into<String>) -> Self {
        Self { step_number, thought: thought.into(), action: None, observation: None, is_final: false }
    }

    pub fn with_action(
        step_number: u32,
        thought: impl Into<String>,
        action: ToolCall,
        observation: impl Into<String>,
    ) -> Self {
        Self {
            step_number,
            thought: thought.into(),
            action: Some(action),
            observation: Some(observation.into()),
            is_final: false,
        }
    }

    pub fn final_step(step_number: u32, thought: impl Into<String>) -> Self {
        Self { step_number, thought: thought.into(), action: None, observation: None, is_final: true }
    }
}

/// Per-request mutable reasoning state, exclusively owned by the request
/// task. Every field is declared up front; `sources` is append-only for
/// the lifetime of the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub query: String,
    pub steps: Vec<AgentStep>,
    pub current_step: u32,
    pub max_steps: u32,
    pub context_gathered: Vec<String>,
    pub sources: Vec<Source>,
    pub final_answer: Option<String>,
}

impl AgentState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            steps: Vec::new(),
            current_step: 0,
            max_steps: DEFAULT_MAX_STEPS,
            context_gathered: Vec::new(),
            sources: Vec::new(),
            final_answer: None,
        }
    }

    pub fn tools_called(&self) -> usize {
        self.steps.iter().filter(|s| s.action.is_some()).count()
    }
}
