// ABOUTME: LLM adapter layer: provider selection, batch scoring seam, and shared types
// ABOUTME: Wraps Gemini and OpenAI-compatible providers behind config-driven enum dispatch
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # LLM Adapter
//!
//! One prompt is built per job batch; the selected provider completes it
//! and the strict-JSON response is parsed positionally back onto the
//! batch's units. Selection is by configuration (`AI_SERVICE`) through the
//! [`AnalysisProvider`] enum: the same shape for every call site, no
//! dynamic dispatch.
//!
//! Transport failures surface as errors so the scheduler can retry
//! transient ones; structural response failures (non-JSON, wrong length,
//! schema violations) resolve to per-unit fallback records instead and are
//! never retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::batcher::WorkUnit;
use crate::config::environment::AiConfig;
use crate::config::types::AiServiceType;
use crate::errors::{AppError, AppResult};
use crate::models::DailyScores;

/// Google Gemini wire client
pub mod gemini;

/// `OpenAI`-compatible wire client
pub mod openai;

/// Batch prompt construction and strict response parsing
pub mod prompt;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// Error marker stored on fallback outcomes
pub const ANALYSIS_FAILED: &str = "analysis_failed";

/// Token usage reported by a provider, when available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    /// Prompt tokens consumed
    pub prompt_tokens: Option<u32>,
    /// Response tokens generated
    pub completion_tokens: Option<u32>,
    /// Total tokens
    pub total_tokens: Option<u32>,
}

/// A raw completion from a provider
#[derive(Debug, Clone)]
pub struct Completion {
    /// Response text
    pub text: String,
    /// Usage metadata if the provider supplied it
    pub usage: Option<LlmUsage>,
}

/// Outcome for one unit in a batch; positional to the request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    /// The five AI-derived micro-metrics
    pub scores: DailyScores,
    /// Topics surfaced for the unit (may be empty)
    pub topics: Vec<String>,
    /// `analysis_failed` when this outcome is a fallback substitution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitOutcome {
    /// Neutral fallback substituted on any structural deviation
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            scores: DailyScores::fallback(),
            topics: Vec::new(),
            error: Some(ANALYSIS_FAILED.to_owned()),
        }
    }

    /// True when this outcome is a fallback substitution
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of scoring one batch
#[derive(Debug, Clone)]
pub struct BatchAnalysis {
    /// Per-unit outcomes, positional to the input
    pub outcomes: Vec<UnitOutcome>,
    /// Usage metadata if the provider supplied it
    pub usage: Option<LlmUsage>,
}

impl BatchAnalysis {
    /// True when any unit fell back
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(UnitOutcome::is_fallback)
    }
}

/// Scoring seam consumed by the job scheduler.
///
/// Production uses [`AnalysisProvider`]; tests substitute synthetic
/// implementations to exercise the scheduler without network calls.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Score one batch of daily work units.
    ///
    /// # Errors
    ///
    /// Returns an error only on transport-level failure (timeout,
    /// connection reset, non-2xx status). Structural response problems
    /// resolve to fallback outcomes in the `Ok` value.
    async fn analyze_daily_batch(&self, units: &[WorkUnit]) -> AppResult<BatchAnalysis>;
}

/// Unified analysis provider wrapping the configured LLM vendor.
///
/// This enum provides a consistent interface regardless of which
/// underlying provider is configured.
pub enum AnalysisProvider {
    /// Google Gemini via the Generative Language API
    Gemini(GeminiClient),
    /// `OpenAI`-compatible chat completions
    OpenAi(OpenAiClient),
}

impl AnalysisProvider {
    /// Create the provider selected by configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the selected provider's API key is missing or
    /// the underlying HTTP client cannot be constructed.
    pub fn from_config(ai: &AiConfig) -> AppResult<Self> {
        match ai.service {
            AiServiceType::Gemini => {
                let api_key = ai
                    .gemini_api_key
                    .as_deref()
                    .ok_or_else(|| AppError::config("GEMINI_API_KEY environment variable not set"))?;
                Ok(Self::Gemini(GeminiClient::new(
                    api_key,
                    &ai.gemini_model,
                    ai.request_timeout,
                )?))
            }
            AiServiceType::OpenAi => {
                let api_key = ai
                    .openai_api_key
                    .as_deref()
                    .ok_or_else(|| AppError::config("OPENAI_API_KEY environment variable not set"))?;
                Ok(Self::OpenAi(OpenAiClient::new(
                    api_key,
                    &ai.openai_model,
                    ai.request_timeout,
                )?))
            }
        }
    }

    /// Provider name for logging and statistics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Gemini(_) => "gemini",
            Self::OpenAi(_) => "openai",
        }
    }

    /// Complete a prompt with the configured provider
    async fn complete(&self, prompt: &str) -> AppResult<Completion> {
        match self {
            Self::Gemini(client) => client.complete(prompt).await,
            Self::OpenAi(client) => client.complete(prompt).await,
        }
    }
}

impl std::fmt::Debug for AnalysisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini(_) => f.debug_tuple("AnalysisProvider::Gemini").finish(),
            Self::OpenAi(_) => f.debug_tuple("AnalysisProvider::OpenAi").finish(),
        }
    }
}

#[async_trait]
impl ScoreProvider for AnalysisProvider {
    async fn analyze_daily_batch(&self, units: &[WorkUnit]) -> AppResult<BatchAnalysis> {
        if units.is_empty() {
            return Ok(BatchAnalysis {
                outcomes: Vec::new(),
                usage: None,
            });
        }

        let batch_prompt = prompt::build_batch_prompt(units);
        let completion = self.complete(&batch_prompt).await?;
        let outcomes = prompt::parse_batch_response(&completion.text, units.len());

        Ok(BatchAnalysis {
            outcomes,
            usage: completion.usage,
        })
    }
}
