// ABOUTME: Google Gemini wire client for batch conversation scoring
// ABOUTME: Maps Generative Language API responses and errors into the adapter types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Gemini Client
//!
//! Thin wire client for the Generative Language API `generateContent`
//! endpoint. Retries live in the job scheduler, not here: each call is a
//! single attempt bounded by the configured request timeout, and failures
//! are classified so the scheduler can tell transient from structural.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::llm::{Completion, LlmUsage};

/// Base URL for the Gemini API
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Low temperature keeps scoring runs comparable
const SCORING_TEMPERATURE: f32 = 0.1;

/// Gemini API request structure
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

/// Content structure for the Gemini API
#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

/// Text part of a content block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContentPart {
    text: String,
}

/// Generation configuration
#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "candidateCount")]
    candidate_count: u32,
}

/// Gemini API response structure
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
    error: Option<GeminiError>,
}

/// Response candidate
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

/// Usage metadata from a Gemini response
#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates: Option<u32>,
    #[serde(rename = "totalTokenCount")]
    total: Option<u32>,
}

/// API error body from Gemini
#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Google Gemini wire client
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiClient {
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
            client,
        })
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
        let url = format!(
            "{API_BASE_URL}/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_owned()),
                parts: vec![ContentPart {
                    text: prompt.to_owned(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: SCORING_TEMPERATURE,
                candidate_count: 1,
            },
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending scoring request to Gemini");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::external_unavailable(format!("failed to read Gemini response: {e}")))?;

        if !status.is_success() {
            return Err(map_api_error(status.as_u16(), &body));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::external_service(format!("failed to parse Gemini response envelope: {e}"))
        })?;

        if let Some(error) = gemini_response.error {
            return Err(AppError::external_service(format!(
                "Gemini API error: {}",
                error.message
            )));
        }

        let usage = gemini_response.usage_metadata.as_ref().map(|m| LlmUsage {
            prompt_tokens: m.prompt,
            completion_tokens: m.candidates,
            total_tokens: m.total,
        });

        let text = extract_text(&gemini_response)?;
        Ok(Completion { text, usage })
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // api_key intentionally omitted
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Extract text content from a Gemini response
fn extract_text(response: &GeminiResponse) -> AppResult<String> {
    let candidate = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .ok_or_else(|| AppError::external_service("no candidates in Gemini response"))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason == "SAFETY" || reason == "RECITATION" {
            return Err(AppError::external_service(format!(
                "response blocked by Gemini filter: {reason}"
            )));
        }
    }

    candidate
        .content
        .as_ref()
        .and_then(|c| c.parts.first())
        .map(|p| p.text.clone())
        .ok_or_else(|| AppError::external_service("no content parts in Gemini response"))
}

/// Classify a reqwest failure: timeouts and connection errors are transient
fn map_reqwest_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() {
        AppError::external_unavailable(format!("Gemini request failed: {e}"))
    } else {
        AppError::external_service(format!("Gemini request failed: {e}"))
    }
}

/// Map a non-2xx status to the matching error class
fn map_api_error(status: u16, body: &str) -> AppError {
    let message = serde_json::from_str::<GeminiResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map_or_else(|| body.chars().take(200).collect::<String>(), |e| e.message);

    match status {
        429 => AppError::external_rate_limited(format!("Gemini rate limit: {message}")),
        s if s >= 500 => {
            AppError::external_unavailable(format!("Gemini API error ({s}): {message}"))
        }
        s => AppError::external_service(format!("Gemini API error ({s}): {message}")),
    }
}
