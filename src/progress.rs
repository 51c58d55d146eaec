// ABOUTME: Per-upload progress tracking: stages, counts, statistics, and bounded errors
// ABOUTME: Process-wide registry polled by the progress endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Progress Tracker
//!
//! In-memory, process-lifetime registry of upload progress. Consumers poll
//! by `upload_id`. Updates are fine-grained and lock-protected so the
//! scheduler's concurrent workers can record statistics safely.
//!
//! Completion never reports 100% unless at least one conversation was
//! processed or the upload was empty from the start; otherwise the
//! terminal status is `completed_with_filters` with the accurate
//! percentage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// Maximum retained error entries per upload
const MAX_ERRORS: usize = 50;

/// Errors included in a progress snapshot
const SNAPSHOT_ERRORS: usize = 5;

/// Upload lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Accepted, background work not yet started
    Pending,
    /// Pipeline running
    Processing,
    /// Finished with at least one conversation processed
    Completed,
    /// Finished, but every message was filtered (or the upload was empty)
    CompletedWithFilters,
    /// Fatal pipeline failure or total-upload timeout
    Failed,
    /// Cancelled by the client or process shutdown
    Cancelled,
}

impl UploadStatus {
    /// True once the upload can no longer change state
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    /// Payload received, not yet examined
    Receiving,
    /// Per-message validation
    Validating,
    /// Skipping already-processed chats
    FilteringConversations,
    /// Raw data transaction
    Persisting,
    /// Token-bounded job packing
    Batching,
    /// LLM scoring in flight
    AiAnalysis,
    /// Metric cache refresh and processed-chat marking
    Finalizing,
}

/// Per-upload statistic counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UploadStatistics {
    /// Messages filtered as the known auto-reply
    pub filtered_autoresponses: u64,
    /// Messages filtered as structurally invalid
    pub filtered_invalid: u64,
    /// LLM calls attempted (retries included)
    pub ai_calls_made: u64,
    /// Jobs that ended failed or fell back
    pub ai_failures: u64,
    /// Total tokens reported by the provider
    pub tokens_used: u64,
}

/// One recorded error with its timestamp
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
    /// Error description
    pub error: String,
}

/// Internal per-upload record
#[derive(Debug, Clone)]
struct UploadProgress {
    status: UploadStatus,
    current_stage: UploadStage,
    processed_conversations: u64,
    total_conversations: u64,
    total_jobs: u64,
    completed_jobs: u64,
    start_time: DateTime<Utc>,
    last_update: DateTime<Utc>,
    details: String,
    statistics: UploadStatistics,
    errors: Vec<ErrorEntry>,
}

impl UploadProgress {
    fn new(total_conversations: u64) -> Self {
        let now = Utc::now();
        Self {
            status: UploadStatus::Pending,
            current_stage: UploadStage::Receiving,
            processed_conversations: 0,
            total_conversations,
            total_jobs: 0,
            completed_jobs: 0,
            start_time: now,
            last_update: now,
            details: String::new(),
            statistics: UploadStatistics::default(),
            errors: Vec::new(),
        }
    }

    /// Derived percentage: job completion during analysis, 100 only in a
    /// terminal state that earned it
    fn progress_percentage(&self) -> f64 {
        let job_pct = if self.total_jobs == 0 {
            0.0
        } else {
            (self.completed_jobs as f64 / self.total_jobs as f64) * 100.0
        };

        match self.status {
            UploadStatus::Pending => 0.0,
            // 100 is reserved for terminal states
            UploadStatus::Processing => job_pct.min(99.0),
            UploadStatus::Completed => 100.0,
            UploadStatus::CompletedWithFilters => {
                if self.total_conversations == 0 {
                    100.0
                } else {
                    job_pct
                }
            }
            UploadStatus::Failed | UploadStatus::Cancelled => job_pct,
        }
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}

/// Publicly visible snapshot of one upload's progress
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// Upload identifier
    pub upload_id: String,
    /// Lifecycle state
    pub status: UploadStatus,
    /// Derived completion percentage
    pub progress_percentage: f64,
    /// Current pipeline stage
    pub current_stage: UploadStage,
    /// Conversations that produced at least one scored day
    pub processed_conversations: u64,
    /// Conversations in the upload
    pub total_conversations: u64,
    /// Human-readable stage detail
    pub details: String,
    /// When tracking started
    pub start_time: DateTime<Utc>,
    /// Last mutation time
    pub last_update: DateTime<Utc>,
    /// Seconds between start and last update
    pub duration_seconds: f64,
    /// Statistic counters
    pub statistics: UploadStatistics,
    /// Most recent errors (bounded)
    pub errors: Vec<ErrorEntry>,
}

/// Process-wide progress registry
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<String, UploadProgress>>>,
}

impl ProgressTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new upload
    pub async fn register(&self, upload_id: &str, total_conversations: u64) {
        let mut uploads = self.inner.write().await;
        uploads.insert(upload_id.to_owned(), UploadProgress::new(total_conversations));
        info!(upload_id, total_conversations, "Started tracking upload");
    }

    /// Transition to a pipeline stage with a detail string
    pub async fn set_stage(&self, upload_id: &str, stage: UploadStage, details: &str) {
        self.update(upload_id, |p| {
            p.status = UploadStatus::Processing;
            p.current_stage = stage;
            p.details = details.to_owned();
        })
        .await;
    }

    /// Record how many conversations produced at least one scored day
    pub async fn set_processed_conversations(&self, upload_id: &str, processed: u64) {
        self.update(upload_id, |p| p.processed_conversations = processed)
            .await;
    }

    /// Record the job count once batching has run
    pub async fn set_total_jobs(&self, upload_id: &str, total: u64) {
        self.update(upload_id, |p| p.total_jobs = total).await;
    }

    /// Record one job reaching a terminal state
    pub async fn record_job_finished(&self, upload_id: &str) {
        self.update(upload_id, |p| p.completed_jobs += 1).await;
    }

    /// Count messages filtered as auto-replies
    pub async fn record_filtered_autoresponses(&self, upload_id: &str, count: u64) {
        self.update(upload_id, |p| p.statistics.filtered_autoresponses += count)
            .await;
    }

    /// Count messages filtered as invalid
    pub async fn record_filtered_invalid(&self, upload_id: &str, count: u64) {
        self.update(upload_id, |p| p.statistics.filtered_invalid += count)
            .await;
    }

    /// Count one LLM call attempt
    pub async fn record_ai_call(&self, upload_id: &str) {
        self.update(upload_id, |p| p.statistics.ai_calls_made += 1).await;
    }

    /// Count one failed or fallback-resolved job
    pub async fn record_ai_failure(&self, upload_id: &str) {
        self.update(upload_id, |p| p.statistics.ai_failures += 1).await;
    }

    /// Accumulate provider-reported token usage
    pub async fn record_tokens_used(&self, upload_id: &str, tokens: u64) {
        self.update(upload_id, |p| p.statistics.tokens_used += tokens).await;
    }

    /// Append an error (bounded; the oldest entries are dropped)
    pub async fn add_error(&self, upload_id: &str, error: impl Into<String>) {
        let entry = ErrorEntry {
            timestamp: Utc::now(),
            error: error.into(),
        };
        self.update(upload_id, move |p| {
            if p.errors.len() >= MAX_ERRORS {
                p.errors.remove(0);
            }
            p.errors.push(entry);
        })
        .await;
    }

    /// Finish the upload successfully, deciding the terminal status.
    ///
    /// `completed` requires at least one processed conversation; a
    /// non-empty upload where everything was filtered (or every chat
    /// skipped) terminates as `completed_with_filters`.
    pub async fn complete(&self, upload_id: &str) -> Option<UploadStatus> {
        let mut uploads = self.inner.write().await;
        let progress = uploads.get_mut(upload_id)?;

        progress.status = if progress.processed_conversations == 0 {
            UploadStatus::CompletedWithFilters
        } else {
            UploadStatus::Completed
        };
        progress.touch();

        info!(
            upload_id,
            status = ?progress.status,
            processed = progress.processed_conversations,
            "Upload finished"
        );
        Some(progress.status)
    }

    /// Mark the upload failed with a recorded reason
    pub async fn fail(&self, upload_id: &str, error: impl Into<String>) {
        let entry = ErrorEntry {
            timestamp: Utc::now(),
            error: error.into(),
        };
        self.update(upload_id, move |p| {
            p.status = UploadStatus::Failed;
            if p.errors.len() >= MAX_ERRORS {
                p.errors.remove(0);
            }
            p.errors.push(entry);
        })
        .await;
    }

    /// Mark the upload cancelled
    pub async fn cancel(&self, upload_id: &str) {
        self.update(upload_id, |p| p.status = UploadStatus::Cancelled).await;
    }

    /// Snapshot one upload's progress
    pub async fn snapshot(&self, upload_id: &str) -> Option<ProgressSnapshot> {
        let uploads = self.inner.read().await;
        uploads.get(upload_id).map(|p| snapshot_of(upload_id, p))
    }

    /// Snapshot every upload that is still pending or processing
    pub async fn active(&self) -> Vec<ProgressSnapshot> {
        let uploads = self.inner.read().await;
        uploads
            .iter()
            .filter(|(_, p)| !p.status.is_terminal())
            .map(|(id, p)| snapshot_of(id, p))
            .collect()
    }

    /// Drop tracking records older than the given age
    pub async fn cleanup_older_than(&self, max_age: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(24));
        let mut uploads = self.inner.write().await;
        let before = uploads.len();
        uploads.retain(|_, p| p.start_time >= cutoff);
        let removed = before - uploads.len();
        if removed > 0 {
            info!(removed, "Cleaned up old upload records");
        }
    }

    async fn update(&self, upload_id: &str, mutate: impl FnOnce(&mut UploadProgress)) {
        let mut uploads = self.inner.write().await;
        if let Some(progress) = uploads.get_mut(upload_id) {
            mutate(progress);
            progress.touch();
        }
    }
}

fn snapshot_of(upload_id: &str, progress: &UploadProgress) -> ProgressSnapshot {
    let duration = progress.last_update - progress.start_time;
    let errors = progress
        .errors
        .iter()
        .rev()
        .take(SNAPSHOT_ERRORS)
        .rev()
        .cloned()
        .collect();

    ProgressSnapshot {
        upload_id: upload_id.to_owned(),
        status: progress.status,
        progress_percentage: progress.progress_percentage(),
        current_stage: progress.current_stage,
        processed_conversations: progress.processed_conversations,
        total_conversations: progress.total_conversations,
        details: progress.details.clone(),
        start_time: progress.start_time,
        last_update: progress.last_update,
        duration_seconds: duration.num_milliseconds() as f64 / 1_000.0,
        statistics: progress.statistics,
        errors,
    }
}
