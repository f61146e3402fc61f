//! Language-model generation.
//!
//! [`ChatModel`] takes an ordered list of role-tagged messages and returns
//! the generated text. [`OpenAIChat`] calls an OpenAI-compatible
//! `POST {base_url}/chat/completions` endpoint without streaming.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Author of a chat message, serialized lowercase as the API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Instructions and grounding context.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// The end user's question.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Trait for chat-completion providers.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Generate one reply to `messages`, in order.
    ///
    /// # Errors
    ///
    /// Transport failures are returned as the underlying `reqwest::Error`
    /// so callers can tell them apart from unusable replies (non-2xx
    /// status, malformed body, no content, content filter).
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// A chat model that always fails; used when `[generation].provider` is
/// `"disabled"`.
pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

/// Chat model backed by an OpenAI-compatible API.
///
/// Calls `POST {base_url}/chat/completions` once per question, without
/// streaming or retries.
pub struct OpenAIChat {
    model: String,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAIChat {
    /// Reads `OPENAI_API_KEY` once.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not set or the HTTP client cannot be
    /// built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    /// Build with an explicit key instead of reading the environment.
    pub fn with_api_key(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            client,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI chat API error {}: {}", status, body_text);
        }

        // Decode separately so a malformed body is not mistaken for a
        // transport error.
        let body = response.text().await?;
        let payload: serde_json::Value = serde_json::from_str(&body)
            .context("Invalid chat response: body is not JSON")?;
        parse_chat_response(&payload)
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(payload: &serde_json::Value) -> Result<String> {
    let choice = payload
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow!("Invalid chat response: no choices"))?;

    if choice.get("finish_reason").and_then(|r| r.as_str()) == Some("content_filter") {
        bail!("Chat response was blocked by the content filter");
    }

    choice
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat response: missing message content"))
}

/// Construct the chat model named by `[generation].provider`.
///
/// # Errors
///
/// Fails for unknown providers and when the OpenAI key is missing.
pub fn create_chat_model(config: &GenerationConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
