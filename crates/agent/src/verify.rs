//! Draft verification: is the answer supported by the retrieved context?
//!
//! Two implementations behind one trait: a gateway-backed verifier for
//! production and a deterministic lexical verifier used as fallback and in
//! tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use zantara_llm::{ChatGateway, ChatSession, ModelTier};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub is_valid: bool,
    pub status: String,
    pub score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub missing_citations: Vec<String>,
}

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        query: &str,
        draft_answer: &str,
        context_chunks: &[String],
    ) -> Result<Verification>;
}

// ── Deterministic lexical verifier ──────────────────────────────────────────

/// Scores a draft by the fraction of its sentences whose content words
/// overlap the retrieved context. Cheap, deterministic, and good enough to
/// catch answers invented from thin air.
#[derive(Debug, Clone, Default)]
pub struct LexicalVerifier {
    /// A sentence counts as supported above this term-overlap ratio.
    overlap_threshold: f64,
}

impl LexicalVerifier {
    pub fn new() -> Self {
        Self { overlap_threshold: 0.3 }
    }
}

fn content_words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_lowercase())
        .collect()
}

#[async_trait]
impl Verifier for LexicalVerifier {
    async fn verify(
        &self,
        _query: &str,
        draft_answer: &str,
        context_chunks: &[String],
    ) -> Result<Verification> {
        let context_terms = content_words(&context_chunks.join(" "));
        let sentences: Vec<&str> = draft_answer
            .split(['.', '!', '?', '\n'])
            .map(str::trim)
            .filter(|s| s.len() > 15)
            .collect();

        if sentences.is_empty() || context_terms.is_empty() {
            return Ok(Verification {
                is_valid: true,
                status: "valid".to_string(),
                score: 1.0,
                reasoning: "nothing substantive to verify".to_string(),
                missing_citations: Vec::new(),
            });
        }

        let mut supported = 0usize;
        let mut unsupported: Vec<String> = Vec::new();
        for sentence in &sentences {
            let terms = content_words(sentence);
            if terms.is_empty() {
                supported += 1;
                continue;
            }
            let overlap = terms.intersection(&context_terms).count() as f64 / terms.len() as f64;
            if overlap >= self.overlap_threshold {
                supported += 1;
            } else {
                unsupported.push(sentence.chars().take(80).collect());
            }
        }

        let score = supported as f64 / sentences.len() as f64;
        let is_valid = score >= 0.7;
        Ok(Verification {
            is_valid,
            status: if is_valid { "valid" } else { "unsupported" }.to_string(),
            score: (score * 100.0).round() / 100.0,
            reasoning: format!("{supported}/{} sentences supported by context", sentences.len()),
            missing_citations: unsupported,
        })
    }
}

// ── Gateway-backed verifier ─────────────────────────────────────────────────

const VERIFIER_PROMPT: &str = "\
You are a strict fact-checker. Judge whether the draft answer is supported
by the provided context. Respond with ONLY a JSON object:
{\"is_valid\": bool, \"status\": \"valid|unsupported|partial\", \"score\": 0.0-1.0,
 \"reasoning\": \"...\", \"missing_citations\": [\"claim without support\", ...]}";

pub struct GatewayVerifier {
    gateway: Arc<dyn ChatGateway>,
}

impl GatewayVerifier {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Verifier for GatewayVerifier {
    async fn verify(
        &self,
        query: &str,
        draft_answer: &str,
        context_chunks: &[String],
    ) -> Result<Verification> {
        let message = format!(
            "QUERY:\n{query}\n\nDRAFT ANSWER:\n{draft_answer}\n\nCONTEXT:\n{}",
            context_chunks.join("\n---\n")
        );
        let mut chat = ChatSession::new("verification");
        let reply = self
            .gateway
            .send_message(&mut chat, &message, VERIFIER_PROMPT, ModelTier::Lite, false)
            .await?;

        parse_verification(&reply.text)
            .ok_or_else(|| anyhow::anyhow!("verifier returned unparseable output"))
    }
}

fn parse_verification(text: &str) -> Option<Verification> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let mut verification: Verification = serde_json::from_str(&text[start..=end]).ok()?;
    verification.score = verification.score.clamp(0.0, 1.0);
    Some(verification)
}
