//! Request/response shapes and client for the Gemini `generateContent`
//! REST endpoint, including native function-calling parts.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{ChatMessage, ChatRole};

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One declared tool function, projected from a tool's parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A native function call extracted from a response part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// One part of a candidate's content: text, a function call, or both empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, rename = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

/// Raw model response kept for native function-call parsing. The OpenRouter
/// path produces no raw response, which signals the regex fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl RawResponse {
    /// Concatenated text across all candidate parts.
    pub fn text(&self) -> String {
        self.candidates
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    /// First function call in any part, if present.
    pub fn function_call(&self) -> Option<&FunctionCall> {
        self.candidates
            .iter()
            .flat_map(|c| c.parts.iter())
            .find_map(|p| p.function_call.as_ref())
    }
}

/// Thin client for one Gemini model id.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    pub fn configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// One `generateContent` round trip: transcript + new message, optional
    /// system instruction and tool declarations.
    pub async fn generate(
        &self,
        model: &str,
        history: &[ChatMessage],
        message: &str,
        system_prompt: &str,
        tools: Option<&[FunctionDeclaration]>,
        image: Option<(&str, &[u8])>,
    ) -> Result<RawResponse> {
        if !self.configured() {
            anyhow::bail!("gemini api key not configured");
        }

        let mut contents: Vec<Value> = history
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| {
                let role = match m.role {
                    ChatRole::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut user_parts = vec![json!({"text": message})];
        if let Some((mime, bytes)) = image {
            user_parts.push(json!({
                "inline_data": {"mime_type": mime, "data": base64_encode(bytes)},
            }));
        }
        contents.push(json!({"role": "user", "parts": user_parts}));

        let mut payload = json!({"contents": contents});
        if !system_prompt.is_empty() {
            payload["system_instruction"] = json!({"parts": [{"text": system_prompt}]});
        }
        if let Some(declarations) = tools.filter(|t| !t.is_empty()) {
            payload["tools"] = json!([{"function_declarations": declarations}]);
        }

        let url = format!("{GEMINI_BASE}/{model}:generateContent");
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("gemini connection error: {e}"))?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            anyhow::bail!("gemini error ({status}): {message}");
        }

        let raw = parse_generate_response(&body);
        debug!(model, candidates = raw.candidates.len(), "gemini response received");
        Ok(raw)
    }
}

fn parse_generate_response(body: &Value) -> RawResponse {
    let mut raw = RawResponse::default();
    let Some(candidates) = body.get("candidates").and_then(|c| c.as_array()) else {
        return raw;
    };
    for candidate in candidates {
        let mut parsed = Candidate::default();
        if let Some(parts) = candidate.pointer("/content/parts").and_then(|p| p.as_array()) {
            for part in parts {
                let mut out = ResponsePart::default();
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    out.text = Some(text.to_string());
                }
                if let Some(fc) = part.get("functionCall") {
                    let name = fc.get("name").and_then(|n| n.as_str()).unwrap_or_default();
                    let args = fc
                        .get("args")
                        .and_then(|a| a.as_object())
                        .cloned()
                        .unwrap_or_default();
                    out.function_call = Some(FunctionCall { name: name.to_string(), args });
                }
                parsed.parts.push(out);
            }
        }
        raw.candidates.push(parsed);
    }
    raw
}

/// Minimal standard base64, used to inline vision payloads.
pub fn base64_encode(bytes: &[u8]) -> String {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        out.push(TABLE[(triple >> 18) as usize & 63] as char);
        out.push(TABLE[(triple >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 { TABLE[(triple >> 6) as usize & 63] as char } else { '=' });
        out.push(if chunk.len() > 2 { TABLE[triple as usize & 63] as char } else { '=' });
    }
    out
}
