//! Conversation-history compression: keep a verbatim recent window inside
//! the token budget and fold older turns into a compact summary block.

use serde_json::Value;

use zantara_llm::TokenEstimator;

#[derive(Debug, Clone)]
pub struct ContextWindowManager {
    max_tokens: usize,
    recent_window_tokens: usize,
    summary_max_tokens: usize,
    estimator: TokenEstimator,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessedHistory {
    /// Messages kept verbatim for the chat session.
    pub messages: Vec<Value>,
    /// Rendered block for the initial prompt.
    pub formatted_context: String,
    pub total_messages: usize,
    pub messages_in_context: usize,
    pub tokens: usize,
}

impl Default for ContextWindowManager {
    fn default() -> Self {
        Self::new(8000, 4000, 500)
    }
}

impl ContextWindowManager {
    pub fn new(max_tokens: usize, recent_window_tokens: usize, summary_max_tokens: usize) -> Self {
        Self {
            max_tokens,
            recent_window_tokens,
            summary_max_tokens,
            estimator: TokenEstimator,
        }
    }

    pub fn process_conversation_history(&self, history: &[Value]) -> ProcessedHistory {
        let entries: Vec<(&str, &str)> = history
            .iter()
            .filter_map(|m| {
                let object = m.as_object()?;
                let role = object.get("role").and_then(|r| r.as_str()).unwrap_or("user");
                let content = object.get("content").and_then(|c| c.as_str())?;
                Some((role, content))
            })
            .collect();

        // Recent window: walk backwards until the budget is spent.
        let mut recent_start = entries.len();
        let mut recent_tokens = 0usize;
        while recent_start > 0 {
            let (role, content) = entries[recent_start - 1];
            let cost = self.estimator.estimate_tokens(content)
                + self.estimator.estimate_tokens(role)
                + 4;
            if recent_tokens + cost > self.recent_window_tokens && recent_start < entries.len() {
                break;
            }
            recent_tokens += cost;
            recent_start -= 1;
        }

        // Older turns collapse into one summary block, each trimmed hard.
        let mut summary_lines: Vec<String> = Vec::new();
        let mut summary_tokens = 0usize;
        for (role, content) in &entries[..recent_start] {
            let trimmed: String = content.chars().take(120).collect();
            let line = format!("{}: {trimmed}", role.to_uppercase());
            let cost = self.estimator.estimate_tokens(&line);
            if summary_tokens + cost > self.summary_max_tokens {
                break;
            }
            summary_tokens += cost;
            summary_lines.push(line);
        }

        let mut formatted = String::new();
        if !summary_lines.is_empty() {
            formatted.push_str("[Earlier conversation summary]\n");
            formatted.push_str(&summary_lines.join("\n"));
            formatted.push_str("\n\n");
        }
        for (role, content) in &entries[recent_start..] {
            formatted.push_str(&format!("{}: {content}\n", role.to_uppercase()));
        }

        // Absolute ceiling: trim the head of the rendered block if the
        // recent window plus summary still exceed the budget.
        let mut total_tokens = self.estimator.estimate_tokens(&formatted);
        if total_tokens > self.max_tokens {
            let keep_chars = formatted.chars().count() * self.max_tokens / total_tokens.max(1);
            let skip = formatted.chars().count().saturating_sub(keep_chars);
            formatted = formatted.chars().skip(skip).collect();
            total_tokens = self.estimator.estimate_tokens(&formatted);
        }

        let kept: Vec<Value> = entries[recent_start..]
            .iter()
            .map(|(role, content)| serde_json::json!({"role": role, "content": content}))
            .collect();

        ProcessedHistory {
            messages: kept,
            formatted_context: formatted,
            total_messages: entries.len(),
            messages_in_context: entries.len() - recent_start,
            tokens: total_tokens,
        }
    }
}

/// Fallback when compression fails upstream: last 10 messages, each capped
/// to 500 chars.
pub fn truncate_history_fallback(history: &[Value]) -> (Vec<Value>, String) {
    let start = history.len().saturating_sub(10);
    let recent: Vec<Value> = history[start..].to_vec();

    let mut text = String::from("\n\nCONVERSATION HISTORY:\n");
    for message in &recent {
        let Some(object) = message.as_object() else { continue };
        let role = object.get("role").and_then(|r| r.as_str()).unwrap_or("unknown");
        let content = object.get("content").and_then(|c| c.as_str()).unwrap_or("");
        let capped: String = content.chars().take(500).collect();
        let suffix = if content.chars().count() > 500 { "..." } else { "" };
        text.push_str(&format!("{}: {capped}{suffix}\n", role.to_uppercase()));
    }
    (recent, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(role: &str, content: &str) -> Value {
        json!({"role": role, "content": content})
    }

    #[test]
    fn short_history_is_kept_verbatim() {
        let history = vec![turn("user", "hello"), turn("assistant", "hi, how can I help?")];
        let processed = ContextWindowManager::default().process_conversation_history(&history);
        assert_eq!(processed.messages_in_context, 2);
        assert!(processed.formatted_context.contains("USER: hello"));
        assert!(!processed.formatted_context.contains("Earlier conversation summary"));
    }

    #[test]
    fn long_history_summarizes_old_turns() {
        let filler = "word ".repeat(400);
        let mut history: Vec<Value> = (0..20).map(|i| {
            turn(if i % 2 == 0 { "user" } else { "assistant" }, &format!("{filler} turn {i}"))
        }).collect();
        history.push(turn("user", "latest question about kitas"));

        let manager = ContextWindowManager::new(8000, 4000, 500);
        let processed = manager.process_conversation_history(&history);

        assert!(processed.messages_in_context < processed.total_messages);
        assert!(processed.formatted_context.contains("Earlier conversation summary"));
        assert!(processed.formatted_context.contains("latest question about kitas"));
        assert!(processed.tokens <= 8000);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let history = vec![json!("not a message"), turn("user", "real message"), json!(42)];
        let processed = ContextWindowManager::default().process_conversation_history(&history);
        assert_eq!(processed.total_messages, 1);
    }

    #[test]
    fn fallback_truncates_to_ten_and_caps_length() {
        let history: Vec<Value> =
            (0..15).map(|i| turn("user", &format!("{} message {i}", "y".repeat(600)))).collect();
        let (recent, text) = truncate_history_fallback(&history);
        assert_eq!(recent.len(), 10);
        assert!(text.contains("..."));
        assert!(text.contains("CONVERSATION HISTORY"));
    }
}
