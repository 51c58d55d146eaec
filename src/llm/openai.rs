// ABOUTME: OpenAI-compatible wire client for batch conversation scoring
// ABOUTME: Works against api.openai.com or any compatible chat-completions endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # `OpenAI`-Compatible Client
//!
//! Chat-completions wire client. Like the Gemini client, this performs a
//! single attempt per call; the job scheduler owns retries and backoff.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::llm::{Completion, LlmUsage};

/// Default chat-completions endpoint base
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Low temperature keeps scoring runs comparable
const SCORING_TEMPERATURE: f32 = 0.1;

/// System message framing the scoring task
const SYSTEM_PROMPT: &str = "You are an expert in customer service quality analysis. Score conversations accurately and respond only with the requested JSON.";

/// Chat-completions request structure
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// Message structure for the chat-completions API
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat-completions response structure
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

/// One response choice
#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
}

/// Usage block of a chat-completions response
#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

/// API error body
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// `OpenAI`-compatible wire client
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl OpenAiClient {
    /// Create a client with an API key, model name, and per-attempt timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            client,
        })
    }

    /// Point the client at a compatible non-OpenAI endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Model this client scores with
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Complete a prompt with a single attempt.
    ///
    /// # Errors
    ///
    /// Returns a transient-classified error on timeout, connection failure,
    /// rate limiting, or 5xx; a non-transient error on anything else.
    pub async fn complete(&self, prompt: &str) -> AppResult<Completion> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_owned(),
                    content: SYSTEM_PROMPT.to_owned(),
                },
                ChatMessage {
                    role: "user".to_owned(),
                    content: prompt.to_owned(),
                },
            ],
            temperature: SCORING_TEMPERATURE,
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending scoring request to OpenAI-compatible endpoint");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::external_unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(map_api_error(status.as_u16(), &body));
        }

        let chat_response: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::external_service(format!("failed to parse chat response envelope: {e}"))
        })?;

        if let Some(error) = chat_response.error {
            return Err(AppError::external_service(format!(
                "chat API error: {}",
                error.message
            )));
        }

        let usage = chat_response.usage.as_ref().map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let text = chat_response
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .ok_or_else(|| AppError::external_service("no choices in chat response"))?;

        Ok(Completion { text, usage })
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // api_key intentionally omitted
        f.debug_struct("OpenAiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Classify a reqwest failure: timeouts and connection errors are transient
fn map_reqwest_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() {
        AppError::external_unavailable(format!("chat request failed: {e}"))
    } else {
        AppError::external_service(format!("chat request failed: {e}"))
    }
}

/// Map a non-2xx status to the matching error class
fn map_api_error(status: u16, body: &str) -> AppError {
    let message = serde_json::from_str::<ChatResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map_or_else(|| body.chars().take(200).collect::<String>(), |e| e.message);

    match status {
        429 => AppError::external_rate_limited(format!("chat API rate limit: {message}")),
        s if s >= 500 => AppError::external_unavailable(format!("chat API error ({s}): {message}")),
        s => AppError::external_service(format!("chat API error ({s}): {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(map_api_error(429, "{}").is_transient());
        assert!(map_api_error(502, "{}").is_transient());
        assert_eq!(map_api_error(429, "{}").http_status(), 429);
    }

    #[test]
    fn parses_usage_block() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}], "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}}"#,
        )
        .unwrap();
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(100));
        assert_eq!(usage.total_tokens, Some(120));
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = OpenAiClient::new("sk-secret", "gpt-4o-mini", Duration::from_secs(5)).unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("sk-secret"));
    }
}
