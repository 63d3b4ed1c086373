//! Hugging Face chat-completion client (OpenAI-compatible wire format).
//!
//! - Bearer token from the environment, held as a secret
//! - 429, 5xx and connection failures retried with exponential backoff
//! - `Retry-After` honoured on 429, capped at 30 seconds

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use documind_core::config::LlmSettings;

use crate::model::{ChatMessage, ChatModel, GenerationParams, LlmError};

const MAX_RETRY_AFTER_SECS: u64 = 30;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct HfInferenceClient {
    client: Client,
    endpoint: String,
    model_id: String,
    token: Option<SecretString>,
    token_env: String,
    max_retries: u32,
}

impl HfInferenceClient {
    /// Build a client from configuration. A missing token is not an error
    /// here; it surfaces on the first `chat` call.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let token = std::env::var(&settings.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::new);
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Config { reason: e.to_string() })?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model_id: settings.model_id.clone(),
            token,
            token_env: settings.token_env.clone(),
            max_retries: settings.max_retries,
        })
    }

    pub fn with_token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage], params: &GenerationParams) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model_id,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            stream: false,
        }
    }

    async fn send_once(&self, token: &SecretString, body: &ChatCompletionRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network { reason: format!("Request failed: {}", e) })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(LlmError::RateLimited { retry_after_secs: retry_after });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Unauthorized { status: status.as_u16(), body });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http { status: status.as_u16(), body });
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Network { reason: format!("Failed to read response: {}", e) })?;
        parse_completion(&text)
    }
}

fn parse_completion(body: &str) -> Result<String, LlmError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse { reason: format!("Failed to parse response: {}", e) })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::MalformedResponse { reason: "response has no choices".to_string() })
}

#[async_trait]
impl ChatModel for HfInferenceClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn chat(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String, LlmError> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| LlmError::MissingCredentials { env: self.token_env.clone() })?;
        let body = self.request_body(messages, params);
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0u32;
        loop {
            match self.send_once(token, &body).await {
                Ok(text) => {
                    debug!(model = %self.model_id, attempt, "chat completion received");
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = match &e {
                        LlmError::RateLimited { retry_after_secs } => {
                            Duration::from_secs((*retry_after_secs).min(MAX_RETRY_AFTER_SECS))
                        }
                        _ => backoff,
                    };
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "retrying chat completion");
                    tokio::time::sleep(delay).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
