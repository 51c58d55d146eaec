// ABOUTME: Synthetic score provider for pipeline testing without network calls
// ABOUTME: Scripts canned responses, transport failures, and hangs per call

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use powerpulse::analysis::batcher::WorkUnit;
use powerpulse::errors::{AppError, AppResult};
use powerpulse::llm::{prompt, BatchAnalysis, LlmUsage, ScoreProvider};

/// What the synthetic provider does on one call
pub enum SyntheticBehavior {
    /// Produce a well-formed response matching the batch length
    Score,
    /// Return this raw text; the real response parser runs over it
    RespondWith(String),
    /// Fail at the transport level
    Fail(AppError),
    /// Sleep, then score (for cancellation and timeout tests)
    Hang(Duration),
}

/// Scripted provider: behaviors are consumed per call, falling back to
/// well-formed scoring once the script runs out.
///
/// Responses flow through the production response parser so structural
/// failures exercise the same fallback path as a real provider.
pub struct SyntheticProvider {
    script: Mutex<VecDeque<SyntheticBehavior>>,
    calls: AtomicU32,
}

impl SyntheticProvider {
    /// Provider that always scores successfully
    pub fn scoring() -> Arc<Self> {
        Self::with_script(Vec::new())
    }

    /// Provider with scripted per-call behaviors
    pub fn with_script(behaviors: Vec<SyntheticBehavior>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(behaviors.into_iter().collect()),
            calls: AtomicU32::new(0),
        })
    }

    /// Calls made so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// A well-formed response body for a batch of the given length
    pub fn well_formed_response(len: usize) -> String {
        let entries: Vec<String> = (0..len)
            .map(|index| {
                format!(
                    r#"{{"index": {index}, "sentiment_score": 7, "sentiment_shift": 1, "resolution_achieved": 8, "fcr_score": 8, "ces": 2, "topics": ["power outage"]}}"#
                )
            })
            .collect();
        format!("[{}]", entries.join(", "))
    }
}

#[async_trait]
impl ScoreProvider for SyntheticProvider {
    async fn analyze_daily_batch(&self, units: &[WorkUnit]) -> AppResult<BatchAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SyntheticBehavior::Score);

        let response = match behavior {
            SyntheticBehavior::Score => Self::well_formed_response(units.len()),
            SyntheticBehavior::RespondWith(text) => text,
            SyntheticBehavior::Fail(error) => return Err(error),
            SyntheticBehavior::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Self::well_formed_response(units.len())
            }
        };

        Ok(BatchAnalysis {
            outcomes: prompt::parse_batch_response(&response, units.len()),
            usage: Some(LlmUsage {
                prompt_tokens: Some(120),
                completion_tokens: Some(40),
                total_tokens: Some(160),
            }),
        })
    }
}
