//! The language-model capability the synthesizer depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use documind_core::config::LlmSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 512, temperature: 0.3, top_p: 0.9 }
    }
}

impl From<&LlmSettings> for GenerationParams {
    fn from(s: &LlmSettings) -> Self {
        Self { max_tokens: s.max_tokens, temperature: s.temperature, top_p: s.top_p }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API token missing: set the {env} environment variable")]
    MissingCredentials { env: String },

    #[error("Authentication rejected (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("Rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Client configuration error: {reason}")]
    Config { reason: String },
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A chat-completion endpoint: messages in, one text completion out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn chat(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String, LlmError>;
}
