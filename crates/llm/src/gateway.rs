//! Tier-routed gateway with cascade fallback.
//!
//! Requested tier degrades on quota/service errors (`Pro → Flash`,
//! `Flash → Lite`, `Lite → OpenRouter`); hard errors (auth, malformed
//! request) jump straight to OpenRouter. The chat transcript lives in the
//! application, so a tier switch rebinds the session without losing turns.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use zantara_config::AppConfig;

use crate::gemini::{FunctionDeclaration, GeminiClient, RawResponse};
use crate::openrouter::{OpenRouterClient, extract_user_turn};
use crate::retry::RetryHandler;
use crate::{ChatMessage, ChatSession, ModelTier};

/// One gateway round trip. `raw` carries the provider's structured parts
/// for native function-call parsing; `None` means the reply came from a
/// provider without native calling and the regex fallback applies.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub text: String,
    pub model_name: String,
    pub raw: Option<RawResponse>,
}

pub type GatewayHealth = HashMap<String, bool>;

/// Seam between the reasoning engine and concrete model providers.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(
        &self,
        chat: &mut ChatSession,
        message: &str,
        system_prompt: &str,
        tier: ModelTier,
        enable_function_calling: bool,
    ) -> Result<GatewayReply>;
}

pub struct LlmGateway {
    gemini: GeminiClient,
    openrouter: OpenRouterClient,
    retry: RetryHandler,
    tools: Vec<FunctionDeclaration>,
    model_pro: String,
    model_flash: String,
    model_flash_lite: String,
}

impl LlmGateway {
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            gemini: GeminiClient::new(http.clone(), config.llm.google_api_key.clone()),
            openrouter: OpenRouterClient::new(
                http,
                config.llm.openrouter_api_key.clone(),
                config.llm.openrouter_model.clone(),
            ),
            retry: RetryHandler::default(),
            tools: Vec::new(),
            model_pro: config.llm.model_pro.clone(),
            model_flash: config.llm.model_flash.clone(),
            model_flash_lite: config.llm.model_flash_lite.clone(),
        }
    }

    /// Install the function declarations projected from the tool registry.
    pub fn with_function_declarations(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn model_for_tier(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Pro => &self.model_pro,
            ModelTier::Flash => &self.model_flash,
            ModelTier::Lite => &self.model_flash_lite,
            ModelTier::OpenRouter => self.openrouter.model(),
        }
    }

    /// Create a chat session with application-managed history.
    pub fn create_chat_with_history(
        &self,
        history: Vec<ChatMessage>,
        tier: ModelTier,
    ) -> ChatSession {
        ChatSession::with_history(self.model_for_tier(tier), history)
    }

    /// One-shot multimodal call for the vision tool.
    pub async fn describe_image(&self, query: &str, mime: &str, bytes: &[u8]) -> Result<String> {
        let raw = self
            .gemini
            .generate(&self.model_flash, &[], query, "", None, Some((mime, bytes)))
            .await?;
        Ok(raw.text())
    }

    async fn call_gemini(
        &self,
        chat: &mut ChatSession,
        model: &str,
        message: &str,
        system_prompt: &str,
        enable_function_calling: bool,
    ) -> Result<RawResponse> {
        chat.rebind(model);
        let tools = if enable_function_calling && !self.tools.is_empty() {
            Some(self.tools.as_slice())
        } else {
            None
        };
        let history = chat.history.clone();
        self.retry
            .execute_with_retry(
                || self.gemini.generate(model, &history, message, system_prompt, tools, None),
                model,
            )
            .await
    }

    fn commit_turn(chat: &mut ChatSession, message: &str, reply_text: &str) {
        chat.push_user(message);
        chat.push_assistant(reply_text);
    }

    async fn call_openrouter(
        &self,
        chat: &mut ChatSession,
        message: &str,
        system_prompt: &str,
    ) -> Result<GatewayReply> {
        info!("gateway using OpenRouter (final fallback, no native function calling)");
        let user_turn = extract_user_turn(message);
        let messages = vec![json!({"role": "user", "content": user_turn})];
        let text = self.openrouter.complete(&messages, system_prompt).await?;
        chat.rebind(self.openrouter.model());
        Self::commit_turn(chat, message, &text);
        Ok(GatewayReply {
            text,
            model_name: "openrouter-fallback".to_string(),
            raw: None,
        })
    }

    /// Ping every model once; used by the diagnostics tool.
    pub async fn health_check(&self) -> GatewayHealth {
        let mut status = GatewayHealth::new();
        for model in [&self.model_pro, &self.model_flash, &self.model_flash_lite] {
            let healthy = self
                .gemini
                .generate(model, &[], "ping", "", None, None)
                .await
                .is_ok();
            if !healthy {
                warn!(model = %model, "health check failed");
            }
            status.insert(model.clone(), healthy);
        }
        status.insert("openrouter".to_string(), self.openrouter.configured());
        status
    }
}

#[async_trait]
impl ChatGateway for LlmGateway {
    async fn send_message(
        &self,
        chat: &mut ChatSession,
        message: &str,
        system_prompt: &str,
        tier: ModelTier,
        enable_function_calling: bool,
    ) -> Result<GatewayReply> {
        let mut tier = tier;

        if tier == ModelTier::Pro {
            match self
                .call_gemini(chat, &self.model_pro.clone(), message, system_prompt, enable_function_calling)
                .await
            {
                Ok(raw) => {
                    let text = raw.text();
                    Self::commit_turn(chat, message, &text);
                    return Ok(GatewayReply { text, model_name: self.model_pro.clone(), raw: Some(raw) });
                }
                Err(err) if RetryHandler::is_retryable(&err) => {
                    warn!("pro tier exhausted, falling back to flash: {err}");
                    tier = ModelTier::Flash;
                }
                Err(err) => {
                    error!("pro tier hard failure, switching to OpenRouter: {err}");
                    tier = ModelTier::OpenRouter;
                }
            }
        }

        if matches!(tier, ModelTier::Flash) {
            match self
                .call_gemini(chat, &self.model_flash.clone(), message, system_prompt, enable_function_calling)
                .await
            {
                Ok(raw) => {
                    let text = raw.text();
                    Self::commit_turn(chat, message, &text);
                    return Ok(GatewayReply { text, model_name: self.model_flash.clone(), raw: Some(raw) });
                }
                Err(err) if RetryHandler::is_retryable(&err) => {
                    warn!("flash tier exhausted, trying flash-lite: {err}");
                    tier = ModelTier::Lite;
                }
                Err(err) => {
                    error!("flash tier hard failure, switching to OpenRouter: {err}");
                    tier = ModelTier::OpenRouter;
                }
            }
        }

        if matches!(tier, ModelTier::Lite) {
            match self
                .call_gemini(chat, &self.model_flash_lite.clone(), message, system_prompt, enable_function_calling)
                .await
            {
                Ok(raw) => {
                    let text = raw.text();
                    Self::commit_turn(chat, message, &text);
                    return Ok(GatewayReply {
                        text,
                        model_name: self.model_flash_lite.clone(),
                        raw: Some(raw),
                    });
                }
                Err(err) if RetryHandler::is_retryable(&err) => {
                    warn!("flash-lite rate limited, switching to OpenRouter: {err}");
                }
                Err(err) => {
                    debug!("flash-lite hard failure: {err}");
                    return Err(err);
                }
            }
        }

        self.call_openrouter(chat, message, system_prompt).await
    }
}
