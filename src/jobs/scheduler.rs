// ABOUTME: Bounded-concurrency job scheduler: FIFO dispatch, retries, and failure isolation
// ABOUTME: Drives each job through the LLM and persists results in per-job transactions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Job Scheduler
//!
//! Jobs are dispatched in creation order; up to `AI_CONCURRENCY` LLM calls
//! may be in flight through a counting semaphore. Between acquiring the
//! semaphore and contacting the LLM, each worker pauses for the configured
//! inter-call delay to smooth the request rate.
//!
//! Every suspension point (semaphore acquisition, the inter-call delay,
//! LLM I/O, database I/O) observes the upload's cancellation token; a
//! cancelled job ends `failed` with `result.error = "cancelled"`.
//!
//! Transient LLM failures (timeout, connection reset, 5xx, rate limit)
//! retry with exponential backoff. Structural failures resolve to per-unit
//! fallback scores; the fallback is the resolution, never retried. A
//! failing job marks only its own daily rows and never stops peer jobs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::analysis::batcher::WorkUnit;
use crate::analysis::csi::{compute_csi, compute_pillars, TimeThresholds};
use crate::analysis::time_metrics::compute_time_metrics;
use crate::config::environment::PipelineConfig;
use crate::database::{DailyUpdate, Database, JobCompletion};
use crate::errors::AppError;
use crate::jobs::cancel::CancellationToken;
use crate::llm::{BatchAnalysis, ScoreProvider, ANALYSIS_FAILED};
use crate::models::JobStatus;
use crate::progress::ProgressTracker;

/// Error marker stored when a job observes cancellation
pub const CANCELLED: &str = "cancelled";

/// One job handed to the scheduler: its row id plus its work units
#[derive(Debug, Clone)]
pub struct JobWork {
    /// Job row id; dispatch is FIFO by this id
    pub job_id: i64,
    /// Units scored together in one prompt
    pub units: Vec<WorkUnit>,
}

/// Exponential backoff policy for transient LLM failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// First-retry delay
    pub base: Duration,
    /// Multiplier applied per retry
    pub factor: u32,
    /// Total attempts (first call included)
    pub attempts: u32,
    /// Jitter upper bound as a fraction of `base`
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2,
            attempts: 3,
            jitter_fraction: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry_index` (0-based):
    /// `base * factor^retry_index + jitter`, jitter in `[0, fraction*base]`
    #[must_use]
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let exponential = self
            .base
            .saturating_mul(self.factor.saturating_pow(retry_index));
        let jitter_max = self.jitter_fraction * self.base.as_secs_f64();
        let jitter = if jitter_max > 0.0 {
            rand::thread_rng().gen_range(0.0..=jitter_max)
        } else {
            0.0
        };
        exponential + Duration::from_secs_f64(jitter)
    }
}

/// Aggregate result of one upload's job run
#[derive(Debug, Default)]
pub struct JobRunSummary {
    /// Jobs that completed cleanly
    pub completed_jobs: u64,
    /// Jobs that failed (fallbacks, transport errors, persistence errors)
    pub failed_jobs: u64,
    /// Jobs that observed cancellation
    pub cancelled_jobs: u64,
    /// Conversations that received at least one scored day
    pub processed_conversation_ids: HashSet<i64>,
}

/// What one job task reports back to the run loop
#[derive(Debug)]
struct JobTaskOutcome {
    status: JobStatus,
    cancelled: bool,
    conversation_ids: Vec<i64>,
}

/// How an LLM call chain ended
enum CallFailure {
    Cancelled,
    Error(AppError),
}

/// Bounded-concurrency scheduler over a score provider
pub struct JobScheduler<P> {
    db: Database,
    provider: Arc<P>,
    tracker: ProgressTracker,
    semaphore: Arc<Semaphore>,
    inter_call_delay: Duration,
    llm_timeout: Duration,
    retry: RetryPolicy,
    thresholds: TimeThresholds,
}

impl<P> Clone for JobScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            provider: Arc::clone(&self.provider),
            tracker: self.tracker.clone(),
            semaphore: Arc::clone(&self.semaphore),
            inter_call_delay: self.inter_call_delay,
            llm_timeout: self.llm_timeout,
            retry: self.retry,
            thresholds: self.thresholds,
        }
    }
}

impl<P: ScoreProvider + 'static> JobScheduler<P> {
    /// Create a scheduler over the shared database, provider, and tracker
    #[must_use]
    pub fn new(
        db: Database,
        provider: Arc<P>,
        tracker: ProgressTracker,
        pipeline: &PipelineConfig,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            db,
            provider,
            tracker,
            semaphore: Arc::new(Semaphore::new(pipeline.ai_concurrency.max(1))),
            inter_call_delay: pipeline.min_inter_call_delay(),
            llm_timeout,
            retry: RetryPolicy::default(),
            thresholds: TimeThresholds::default(),
        }
    }

    /// Override the retry policy (tests use short delays)
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the efficiency-pillar time thresholds
    #[must_use]
    pub const fn with_time_thresholds(mut self, thresholds: TimeThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Run an upload's jobs to completion, FIFO by job id.
    ///
    /// Returns once every job has reached a terminal state (or observed
    /// cancellation). Individual job failures never abort the run.
    pub async fn run_jobs(
        &self,
        upload_id: &str,
        mut jobs: Vec<JobWork>,
        token: &CancellationToken,
    ) -> JobRunSummary {
        jobs.sort_by_key(|job| job.job_id);

        let mut tasks = JoinSet::new();
        for job in jobs {
            let worker = self.clone();
            let upload_id = upload_id.to_owned();
            let token = token.clone();
            tasks.spawn(async move { worker.process_job(&upload_id, job, &token).await });
        }

        let mut summary = JobRunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.cancelled {
                        summary.cancelled_jobs += 1;
                    } else if outcome.status == JobStatus::Completed {
                        summary.completed_jobs += 1;
                    } else {
                        summary.failed_jobs += 1;
                    }
                    summary
                        .processed_conversation_ids
                        .extend(outcome.conversation_ids);
                }
                Err(e) => {
                    error!(upload_id, error = %e, "Job task panicked");
                    summary.failed_jobs += 1;
                }
            }
        }

        info!(
            upload_id,
            completed = summary.completed_jobs,
            failed = summary.failed_jobs,
            cancelled = summary.cancelled_jobs,
            "Job run finished"
        );
        summary
    }

    /// Drive one job through its suspension points
    async fn process_job(
        &self,
        upload_id: &str,
        job: JobWork,
        token: &CancellationToken,
    ) -> JobTaskOutcome {
        // Suspension point: semaphore acquisition
        let permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.abort_cancelled(upload_id, &job).await,
            },
            () = token.cancelled() => return self.abort_cancelled(upload_id, &job).await,
        };

        // Suspension point: inter-call delay, inside the permit
        tokio::select! {
            () = tokio::time::sleep(self.inter_call_delay) => {}
            () = token.cancelled() => {
                drop(permit);
                return self.abort_cancelled(upload_id, &job).await;
            }
        }

        // Suspension point: database I/O
        if let Err(e) = self.db.mark_job_in_progress(job.job_id).await {
            warn!(job_id = job.job_id, error = %e, "Failed to mark job in progress");
        }
        if token.is_cancelled() {
            drop(permit);
            return self.abort_cancelled(upload_id, &job).await;
        }

        let analysis = self.call_with_retries(upload_id, &job, token).await;

        // The semaphore bounds LLM traffic only; persistence runs outside it
        drop(permit);

        let outcome = match analysis {
            Ok(analysis) => self.persist_results(upload_id, &job, analysis).await,
            Err(CallFailure::Cancelled) => return self.abort_cancelled(upload_id, &job).await,
            Err(CallFailure::Error(e)) => self.persist_transport_failure(upload_id, &job, &e).await,
        };

        self.tracker.record_job_finished(upload_id).await;
        outcome
    }

    /// LLM call with exponential backoff on transient failures
    async fn call_with_retries(
        &self,
        upload_id: &str,
        job: &JobWork,
        token: &CancellationToken,
    ) -> Result<BatchAnalysis, CallFailure> {
        let mut attempt: u32 = 0;
        loop {
            if token.is_cancelled() {
                return Err(CallFailure::Cancelled);
            }

            self.tracker.record_ai_call(upload_id).await;

            // Suspension point: LLM I/O, bounded by the per-attempt timeout
            let call = tokio::time::timeout(
                self.llm_timeout,
                self.provider.analyze_daily_batch(&job.units),
            );
            let result = tokio::select! {
                result = call => match result {
                    Ok(inner) => inner,
                    Err(_) => Err(AppError::external_unavailable(format!(
                        "LLM call timed out after {}s",
                        self.llm_timeout.as_secs()
                    ))),
                },
                () = token.cancelled() => return Err(CallFailure::Cancelled),
            };

            match result {
                Ok(analysis) => return Ok(analysis),
                Err(e) if e.is_transient() && attempt + 1 < self.retry.attempts => {
                    attempt += 1;
                    let delay = self.retry.backoff_delay(attempt - 1);
                    warn!(
                        job_id = job.job_id,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient LLM failure, will retry"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = token.cancelled() => return Err(CallFailure::Cancelled),
                    }
                }
                Err(e) => return Err(CallFailure::Error(e)),
            }
        }
    }

    /// Persist a batch analysis: time metrics, pillars, CSI, and the job's
    /// terminal state in one transaction
    async fn persist_results(
        &self,
        upload_id: &str,
        job: &JobWork,
        analysis: BatchAnalysis,
    ) -> JobTaskOutcome {
        if let Some(total) = analysis.usage.and_then(|u| u.total_tokens) {
            self.tracker
                .record_tokens_used(upload_id, u64::from(total))
                .await;
        }

        let mut rows = Vec::with_capacity(job.units.len());
        let mut topic_updates: Vec<(i64, Vec<String>)> = Vec::new();
        let mut item_results = Vec::with_capacity(job.units.len());

        for (index, (unit, outcome)) in job.units.iter().zip(&analysis.outcomes).enumerate() {
            let time = compute_time_metrics(&unit.messages);
            let mut row = DailyUpdate {
                daily_analysis_id: unit.daily_analysis_id,
                sentiment_score: Some(outcome.scores.sentiment_score),
                sentiment_shift: Some(outcome.scores.sentiment_shift),
                resolution_achieved: Some(outcome.scores.resolution_achieved),
                fcr_score: Some(outcome.scores.fcr_score),
                ces: Some(outcome.scores.ces),
                first_response_time: time.first_response_time,
                avg_response_time: time.avg_response_time,
                total_handling_time: time.total_handling_time,
                error: outcome.error.clone(),
                ..DailyUpdate::default()
            };

            if outcome.error.is_none() {
                let pillars = compute_pillars(&outcome.scores, &time, &self.thresholds);
                row.effectiveness_score = pillars.effectiveness;
                row.effort_score = pillars.effort;
                row.efficiency_score = pillars.efficiency;
                row.empathy_score = pillars.empathy;
                row.csi_score = compute_csi(&pillars);

                if !outcome.topics.is_empty() {
                    match topic_updates.iter_mut().find(|(id, _)| *id == unit.conversation_id) {
                        Some((_, topics)) => topics.extend(outcome.topics.iter().cloned()),
                        None => topic_updates.push((unit.conversation_id, outcome.topics.clone())),
                    }
                }
            }

            item_results.push(json!({
                "index": index,
                "daily_analysis_id": unit.daily_analysis_id,
                "chat_id": unit.chat_id,
                "analysis_date": unit.analysis_date.to_string(),
                "csi_score": row.csi_score,
                "error": row.error,
            }));
            rows.push(row);
        }

        let job_failed = analysis.outcomes.iter().any(|o| o.error.is_some());
        let status = if job_failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        let mut result = json!({ "results": item_results });
        if job_failed {
            result["error"] = json!(ANALYSIS_FAILED);
        }

        let conversation_ids: Vec<i64> = {
            let mut ids: Vec<i64> = job.units.iter().map(|u| u.conversation_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        let completion = JobCompletion {
            job_id: job.job_id,
            status,
            result,
            completed_at: Utc::now(),
            rows,
            topic_updates,
        };

        if !self.write_completion(upload_id, job.job_id, &completion).await {
            return JobTaskOutcome {
                status: JobStatus::Failed,
                cancelled: false,
                conversation_ids: Vec::new(),
            };
        }

        if job_failed {
            self.tracker.record_ai_failure(upload_id).await;
            self.tracker
                .add_error(
                    upload_id,
                    format!("job {} resolved with fallback scores", job.job_id),
                )
                .await;
        }

        JobTaskOutcome {
            status,
            cancelled: false,
            conversation_ids,
        }
    }

    /// Persist fallback scores for a job whose LLM call failed outright
    async fn persist_transport_failure(
        &self,
        upload_id: &str,
        job: &JobWork,
        failure: &AppError,
    ) -> JobTaskOutcome {
        warn!(job_id = job.job_id, error = %failure, "Job failed after retries; storing fallbacks");

        let fallback = crate::models::DailyScores::fallback();
        let rows: Vec<DailyUpdate> = job
            .units
            .iter()
            .map(|unit| {
                let time = compute_time_metrics(&unit.messages);
                DailyUpdate {
                    daily_analysis_id: unit.daily_analysis_id,
                    sentiment_score: Some(fallback.sentiment_score),
                    sentiment_shift: Some(fallback.sentiment_shift),
                    resolution_achieved: Some(fallback.resolution_achieved),
                    fcr_score: Some(fallback.fcr_score),
                    ces: Some(fallback.ces),
                    first_response_time: time.first_response_time,
                    avg_response_time: time.avg_response_time,
                    total_handling_time: time.total_handling_time,
                    error: Some(ANALYSIS_FAILED.to_owned()),
                    ..DailyUpdate::default()
                }
            })
            .collect();

        let conversation_ids: Vec<i64> = {
            let mut ids: Vec<i64> = job.units.iter().map(|u| u.conversation_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        let completion = JobCompletion {
            job_id: job.job_id,
            status: JobStatus::Failed,
            result: json!({
                "error": ANALYSIS_FAILED,
                "detail": failure.internal_details(),
            }),
            completed_at: Utc::now(),
            rows,
            topic_updates: Vec::new(),
        };

        let written = self.write_completion(upload_id, job.job_id, &completion).await;

        self.tracker.record_ai_failure(upload_id).await;
        self.tracker
            .add_error(upload_id, format!("job {} failed: {failure}", job.job_id))
            .await;

        JobTaskOutcome {
            status: JobStatus::Failed,
            cancelled: false,
            conversation_ids: if written { conversation_ids } else { Vec::new() },
        }
    }

    /// Mark a job cancelled; rows keep their nulls plus the error marker
    async fn abort_cancelled(&self, upload_id: &str, job: &JobWork) -> JobTaskOutcome {
        let rows = job
            .units
            .iter()
            .map(|unit| DailyUpdate {
                daily_analysis_id: unit.daily_analysis_id,
                error: Some(CANCELLED.to_owned()),
                ..DailyUpdate::default()
            })
            .collect();

        let completion = JobCompletion {
            job_id: job.job_id,
            status: JobStatus::Failed,
            result: json!({ "error": CANCELLED }),
            completed_at: Utc::now(),
            rows,
            topic_updates: Vec::new(),
        };

        // Best effort: at shutdown the pool may already be gone
        if let Err(e) = self.db.complete_job(&completion).await {
            warn!(job_id = job.job_id, error = %e, "Failed to record job cancellation");
        }

        JobTaskOutcome {
            status: JobStatus::Failed,
            cancelled: true,
            conversation_ids: Vec::new(),
        }
    }

    /// Write a job completion, retrying once on database failure.
    ///
    /// After a second failure the job row is best-effort marked failed
    /// without its daily updates, and the upload continues with partial
    /// results.
    async fn write_completion(
        &self,
        upload_id: &str,
        job_id: i64,
        completion: &JobCompletion,
    ) -> bool {
        let first = match self.db.complete_job(completion).await {
            Ok(()) => return true,
            Err(e) => e,
        };
        warn!(job_id, error = %first, "Job result write failed; retrying once");

        if let Err(second) = self.db.complete_job(completion).await {
            error!(job_id, error = %second, "Job result write failed twice");
            self.tracker
                .add_error(upload_id, format!("job {job_id} result write failed: {second:#}"))
                .await;
            self.tracker.record_ai_failure(upload_id).await;

            let mark_failed = JobCompletion {
                job_id,
                status: JobStatus::Failed,
                result: json!({
                    "error": "persistence_failed",
                    "detail": format!("{second:#}"),
                }),
                completed_at: Utc::now(),
                rows: Vec::new(),
                topic_updates: Vec::new(),
            };
            if let Err(e) = self.db.complete_job(&mark_failed).await {
                error!(job_id, error = %e, "Failed to mark job failed after write errors");
            }
            return false;
        }
        true
    }
}
