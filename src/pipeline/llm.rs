//! LLM interaction: build the extraction prompt and call the chat endpoint.
//!
//! This module turns résumé text into the raw JSON answer of the model. All
//! prompt wording lives in [`crate::prompts`]; this module owns the request
//! shape, the answer classification and the retry loop.
//!
//! ## Retry Strategy
//!
//! Hosted LLM APIs fail transiently under load (429 rate limits, 502/503
//! from overloaded backends, dropped connections). Each document gets one
//! call plus at most `max_retries` retries with exponential backoff between
//! them (`retry_backoff_ms * 2^(retry-1)`); the defaults (2 retries, 3 s base)
//! wait 3 s → 6 s. Only [`ModelError::ApiError`] and
//! [`ModelError::Network`] are retried; a request that cannot even be built
//! fails immediately because it would fail identically every time.
//!
//! The HTTP call sits behind [`ChatTransport`] so the retry policy can be
//! exercised without a network.

use crate::config::PipelineConfig;
use crate::error::{Cv2ProfileError, ModelError};
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Body of `POST {chat_endpoint}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<AssistantMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// The model's answer to one extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    /// Raw answer text, expected to be a JSON object.
    pub content: String,
    pub finish_reason: Option<String>,
    /// Calls made, including the successful one.
    pub attempts: u32,
}

impl ModelReply {
    /// The model stopped because it ran out of response budget.
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

// ── Transport ────────────────────────────────────────────────────────────

/// Sends one chat-completion request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ModelError>;
}

/// [`ChatTransport`] over HTTP with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpChatTransport {
    pub fn new(config: &PipelineConfig) -> Result<Self, Cv2ProfileError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(Cv2ProfileError::HttpClient)?;
        Ok(Self::with_client(
            client,
            &config.chat_endpoint,
            config.api_key.clone(),
        ))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ModelError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key.trim());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                ModelError::InvalidRequest(e.to_string())
            } else {
                ModelError::Network(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(ModelError::Network)?;

        if !status.is_success() {
            return Err(ModelError::ApiError {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ModelError::ApiError {
            status: Some(status.as_u16()),
            body: format!("undecodable chat response ({e}): {body}"),
        })
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Exponential backoff schedule for the model call.
///
/// "Up to 3 retries" would mean four calls, but a document whose model
/// endpoint keeps answering 500 must fail after the third call, before a
/// fourth answer is ever requested. The three-call bound wins, so the default
/// is two retries after the first call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Total calls, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// All delays in order, one per retry.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_retries).map(|r| self.delay_for(r)).collect()
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Calls the model once per document, retrying transient failures.
#[derive(Clone)]
pub struct StructuredExtractionClient {
    transport: Arc<dyn ChatTransport>,
    model: String,
    temperature: f32,
    max_tokens: usize,
    max_input_chars: usize,
    retry: RetryPolicy,
}

impl std::fmt::Debug for StructuredExtractionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredExtractionClient")
            .field("transport", &"<dyn ChatTransport>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .finish()
    }
}

impl StructuredExtractionClient {
    pub fn new(transport: Arc<dyn ChatTransport>, config: &PipelineConfig) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Build the request for `text` in `language`.
    ///
    /// `text` is truncated on a local copy; the caller's value is untouched.
    pub fn build_request(&self, text: &str, language: &str) -> ChatRequest {
        let resume = prompts::truncate_for_model(text, self.max_input_chars);
        if resume.len() != text.len() {
            debug!(
                "Résumé text truncated to {} chars for the model",
                self.max_input_chars
            );
        }
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(prompts::system_prompt(language)),
                ChatMessage::user(prompts::user_prompt(&resume)),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Ask the model for the structured profile of `text`.
    pub async fn extract_profile(
        &self,
        text: &str,
        language: &str,
    ) -> Result<ModelReply, ModelError> {
        let request = self.build_request(text, language);
        let start = Instant::now();
        let mut last_err: Option<ModelError> = None;

        let max_retries = self.retry.max_retries;
        for retry in 0..=max_retries {
            let attempt = retry + 1;
            if retry > 0 {
                let backoff = self.retry.delay_for(retry);
                warn!(
                    "Model call: retry {}/{} after {}ms",
                    retry,
                    max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            let outcome = self
                .transport
                .complete(&request)
                .await
                .and_then(|response| reply_from(response, attempt));

            match outcome {
                Ok(reply) => {
                    if reply.truncated() {
                        warn!(
                            "Model answer hit the {}-token budget and may be incomplete",
                            self.max_tokens
                        );
                    }
                    info!(
                        "Model {} answered with {} chars in {:?} ({} attempt(s))",
                        self.model,
                        reply.content.len(),
                        start.elapsed(),
                        reply.attempts
                    );
                    return Ok(reply);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!("Model call: attempt {} failed: {}", attempt, e);
                    last_err = Some(e);
                }
            }
        }

        let last = last_err.unwrap_or_else(|| ModelError::ApiError {
            status: None,
            body: "Unknown error".to_string(),
        });
        Err(ModelError::RetriesExhausted {
            attempts: self.retry.max_attempts(),
            last: Box::new(last),
        })
    }
}

/// Pick the answer out of a 2xx response.
fn reply_from(response: ChatResponse, attempts: u32) -> Result<ModelReply, ModelError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::ApiError {
            status: None,
            body: "chat response contained no choices".to_string(),
        })?;

    let content = choice
        .message
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ModelError::ApiError {
            status: None,
            body: "chat response choice has empty content".to_string(),
        })?;

    Ok(ModelReply {
        content,
        finish_reason: choice.finish_reason,
        attempts,
    })
}
