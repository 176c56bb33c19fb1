//! LLM gateway: tier selection, cascade fallback, and the native
//! function-call surface shared by every model interaction.

pub mod estimator;
pub mod fallback;
pub mod gateway;
pub mod gemini;
pub mod openrouter;
pub mod retry;

pub use estimator::TokenEstimator;
pub use fallback::get_fallback_message;
pub use gateway::{ChatGateway, GatewayHealth, GatewayReply, LlmGateway};
pub use gemini::{Candidate, FunctionCall, FunctionDeclaration, RawResponse, ResponsePart};
pub use retry::RetryHandler;

use serde::{Deserialize, Serialize};

// ── Chat message types ───────────────────────────────────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in the application-managed transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Model capability tier; higher tiers cost more and answer better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelTier {
    Flash,
    Lite,
    Pro,
    OpenRouter,
}

/// Chat session bound to one model. History lives in the application, so a
/// cascade that switches models recreates the session without losing turns.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub model: String,
    pub history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), history: Vec::new() }
    }

    pub fn with_history(model: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        Self { model: model.into(), history }
    }

    /// Carry the transcript into a session bound to a different model.
    pub fn rebind(&mut self, model: &str) {
        if self.model != model {
            self.model = model.to_string();
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content));
    }
}

/// Defensive conversion of loosely-typed history records into chat
/// messages. Non-object entries and unknown roles are skipped.
pub fn history_from_json(history: &[serde_json::Value]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let role = object.get("role").and_then(|r| r.as_str()).unwrap_or("user");
            let content = object.get("content").and_then(|c| c.as_str())?.to_string();
            match role {
                "user" => Some(ChatMessage::user(content)),
                "assistant" | "model" => Some(ChatMessage::assistant(content)),
                _ => None,
            }
        })
        .collect()
}
