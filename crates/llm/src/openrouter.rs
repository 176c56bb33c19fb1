//! OpenRouter fallback client. No native function calling on this path, so
//! the gateway returns no raw response and the reasoning engine drops to
//! the regex parser.

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self { http, api_key, model }
    }

    pub fn configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One chat completion; the system prompt is sent as the first message.
    pub async fn complete(&self, messages: &[Value], system_prompt: &str) -> Result<String> {
        if !self.configured() {
            anyhow::bail!("openrouter api key not configured");
        }

        // Third-party processing: keep an audit trace every time we leave
        // the primary provider.
        warn!(model = %self.model, "routing request through OpenRouter (third-party service)");

        let mut full_messages = vec![json!({"role": "system", "content": system_prompt})];
        full_messages.extend(messages.iter().cloned());

        let payload = json!({
            "model": self.model,
            "messages": full_messages,
        });

        let response = self
            .http
            .post("https://openrouter.ai/api/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://balizero.com")
            .header("X-Title", "Zantara")
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("openrouter connection error: {e}"))?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            anyhow::bail!("openrouter error ({status}): {body}");
        }

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        debug!(chars = content.len(), "openrouter completion received");
        Ok(content)
    }
}

/// Extract just the user's turn from a structured initial prompt so the
/// fallback model does not see the whole scaffold twice. The system prompt
/// travels separately.
pub fn extract_user_turn(message: &str) -> String {
    const QUERY_MARKER: &str = "User Query:";
    const ANTI_PREAMBLE_MARKER: &str = "IMPORTANT: Do NOT start with philosophical statements";

    let mut turn = message.to_string();
    if let Some(start) = message.find(QUERY_MARKER) {
        turn = message[start + QUERY_MARKER.len()..].trim().to_string();
        if let Some(tail) = turn.find(ANTI_PREAMBLE_MARKER) {
            turn = turn[..tail].trim().to_string();
        }
    }

    if turn.len() < 10 { message.to_string() } else { turn }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_user_turn_from_structured_prompt() {
        let message = "SYSTEM SCAFFOLD...\n\nUser Query: How much is an E33G KITAS please?\n\nIMPORTANT: Do NOT start with philosophical statements about lacking context.";
        assert_eq!(extract_user_turn(message), "How much is an E33G KITAS please?");
    }

    #[test]
    fn short_extraction_reverts_to_full_message() {
        let message = "Header\nUser Query: hi\nIMPORTANT: Do NOT start with philosophical statements";
        assert_eq!(extract_user_turn(message), message);
    }

    #[test]
    fn plain_message_passes_through() {
        let message = "Observation: something\n\nContinue with your next thought or provide final answer.";
        assert_eq!(extract_user_turn(message), message);
    }
}
