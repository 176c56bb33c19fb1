use serde::Serialize;
use serde_json::Value;

use zantara_agent::Source;

/// Typed events on the streaming surface. Serialized with a `type` tag and
/// `data` payload so transports can forward them verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// `{status: started}` at the head of the stream, `{status: completed}`
    /// with final metrics near the tail.
    Metadata(Value),
    /// Free-form progress line ("Step 2: Thinking...").
    Status(String),
    ToolStart { name: String, args: Value },
    /// Result preview, truncated to 200 chars.
    ToolEnd { result: String },
    /// One word/whitespace chunk of the final answer.
    Token(String),
    /// Processed citations, emitted after the post-stream pipeline.
    Sources(Vec<Source>),
    /// Stream aborts after this event (followed only by `Done`).
    Error(String),
    /// Terminal state snapshot plus debug info.
    Done(Value),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::Status(_) => "status",
            StreamEvent::ToolStart { .. } => "tool_start",
            StreamEvent::ToolEnd { .. } => "tool_end",
            StreamEvent::Token(_) => "token",
            StreamEvent::Sources(_) => "sources",
            StreamEvent::Error(_) => "error",
            StreamEvent::Done(_) => "done",
        }
    }
}
