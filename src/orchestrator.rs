// ABOUTME: Upload orchestrator: synchronous acceptance plus the end-to-end background pipeline
// ABOUTME: Composes validation, grouping, persistence, batching, scheduling, and finalization
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Upload Orchestrator
//!
//! The boundary between transport and core. Synchronously: validates the
//! payload size, parses it as JSON, registers the upload with the progress
//! tracker, and returns an upload id. Everything else happens on a
//! background task under a per-upload cancellation token and a total-upload
//! timeout.
//!
//! Chat ids already recorded in `processed_chats` are skipped unless the
//! upload was received with `force_reprocess = true`. On successful
//! termination the metric cache is rewritten and the upload's chat ids are
//! marked processed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::batcher::{pack_into_batches, WorkUnit};
use crate::config::environment::ServerConfig;
use crate::database::{Database, IngestedChat};
use crate::errors::{AppError, AppResult};
use crate::ingest::grouper::{group_chat, ChatGroup};
use crate::ingest::validator::{MessageValidator, RejectReason};
use crate::jobs::cancel::{CancellationRegistry, CancellationToken};
use crate::jobs::scheduler::{JobScheduler, JobWork};
use crate::llm::ScoreProvider;
use crate::progress::{ProgressTracker, UploadStage};

/// Parsed upload payload: chat ids mapped to their raw message arrays.
///
/// A `BTreeMap` keeps chat iteration deterministic, which in turn keeps
/// batching and job creation deterministic for identical payloads.
type UploadPayload = BTreeMap<String, Vec<Value>>;

/// Synchronous result of accepting an upload
#[derive(Debug, Clone)]
pub struct UploadAccepted {
    /// Identifier for polling progress
    pub upload_id: String,
}

/// Composes the pipeline components end-to-end
pub struct UploadOrchestrator<P> {
    db: Database,
    tracker: ProgressTracker,
    cancellations: CancellationRegistry,
    scheduler: JobScheduler<P>,
    validator: MessageValidator,
    config: Arc<ServerConfig>,
}

impl<P> Clone for UploadOrchestrator<P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            tracker: self.tracker.clone(),
            cancellations: self.cancellations.clone(),
            scheduler: self.scheduler.clone(),
            validator: self.validator.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<P: ScoreProvider + 'static> UploadOrchestrator<P> {
    /// Wire the orchestrator over shared components
    #[must_use]
    pub fn new(
        db: Database,
        provider: Arc<P>,
        tracker: ProgressTracker,
        config: Arc<ServerConfig>,
    ) -> Self {
        let scheduler = JobScheduler::new(
            db.clone(),
            provider,
            tracker.clone(),
            &config.pipeline,
            config.ai.request_timeout,
        );
        Self {
            db,
            tracker: tracker.clone(),
            cancellations: CancellationRegistry::new(),
            scheduler,
            validator: MessageValidator::new(config.autoresponse.clone()),
            config,
        }
    }

    /// Accept an upload: validate size and shape, register progress, and
    /// schedule the background pipeline. Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error (no upload id allocated) when the payload exceeds
    /// the size guardrail, is not valid JSON, or is not an object mapping
    /// chat ids to message arrays.
    pub async fn accept_upload(
        &self,
        payload: &[u8],
        force_reprocess: bool,
    ) -> AppResult<UploadAccepted> {
        if payload.len() > self.config.max_file_size {
            return Err(AppError::payload_too_large(self.config.max_file_size));
        }

        let parsed: Value = serde_json::from_slice(payload)
            .map_err(|e| AppError::invalid_format(format!("Invalid JSON format: {e}")))?;

        let Some(object) = parsed.as_object() else {
            return Err(AppError::invalid_input(
                "JSON must be an object with chat_id keys",
            ));
        };

        let mut chats: UploadPayload = BTreeMap::new();
        for (chat_id, messages) in object {
            let Some(messages) = messages.as_array() else {
                return Err(AppError::invalid_input(format!(
                    "chat {chat_id}: messages must be an array"
                )));
            };
            chats.insert(chat_id.clone(), messages.clone());
        }

        let upload_id = Uuid::new_v4().to_string();
        let total_conversations = chats.len() as u64;
        info!(%upload_id, total_conversations, force_reprocess, "Upload accepted");

        // Registered before returning so the progress endpoint can resolve
        // the id immediately, status pending
        self.tracker.register(&upload_id, total_conversations).await;
        let token = self.cancellations.register(&upload_id).await;

        let orchestrator = self.clone();
        let id = upload_id.clone();
        tokio::spawn(async move {
            orchestrator.run_pipeline(&id, chats, force_reprocess, token).await;
            orchestrator.cancellations.remove(&id).await;
        });

        Ok(UploadAccepted { upload_id })
    }

    /// Cancel an in-flight upload; returns false when the id is unknown or
    /// already finished
    pub async fn cancel_upload(&self, upload_id: &str) -> bool {
        self.cancellations.cancel(upload_id).await
    }

    /// Cancel every in-flight upload (process shutdown)
    pub async fn shutdown(&self) {
        self.cancellations.cancel_all().await;
    }

    /// Background pipeline entry point, bounded by the total-upload timeout
    async fn run_pipeline(
        &self,
        upload_id: &str,
        chats: UploadPayload,
        force_reprocess: bool,
        token: CancellationToken,
    ) {
        let deadline = self.config.pipeline.upload_timeout();
        match tokio::time::timeout(deadline, self.execute(upload_id, chats, force_reprocess, &token))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(upload_id, error = %e, "Upload pipeline failed");
                self.tracker.fail(upload_id, e.internal_details()).await;
            }
            Err(_) => {
                warn!(upload_id, timeout_secs = deadline.as_secs(), "Upload timed out");
                token.cancel();
                self.tracker
                    .fail(upload_id, format!("upload timed out after {}s", deadline.as_secs()))
                    .await;
            }
        }
    }

    /// The pipeline stages, C1 through finalization
    async fn execute(
        &self,
        upload_id: &str,
        chats: UploadPayload,
        force_reprocess: bool,
        token: &CancellationToken,
    ) -> AppResult<()> {
        // Stage: validation (C1)
        self.tracker
            .set_stage(upload_id, UploadStage::Validating, "validating messages")
            .await;
        let validated = self.validate_chats(upload_id, chats).await;
        if token.is_cancelled() {
            self.tracker.cancel(upload_id).await;
            return Ok(());
        }

        // Stage: skip already-processed chats
        self.tracker
            .set_stage(
                upload_id,
                UploadStage::FilteringConversations,
                "checking processed chats",
            )
            .await;
        let groups = self.filter_processed(validated, force_reprocess).await?;

        // Stage: raw data persistence (C3), one transaction
        self.tracker
            .set_stage(upload_id, UploadStage::Persisting, "persisting conversations")
            .await;
        let ingested = self.db.ingest_upload(&groups).await?;
        if token.is_cancelled() {
            self.tracker.cancel(upload_id).await;
            return Ok(());
        }

        // Stage: token-bounded job packing (C4)
        self.tracker
            .set_stage(upload_id, UploadStage::Batching, "creating analysis jobs")
            .await;
        let jobs = self.create_jobs(upload_id, groups, &ingested).await?;
        self.tracker.set_total_jobs(upload_id, jobs.len() as u64).await;

        // Stage: LLM scoring (C5/C6/C7/C8)
        self.tracker
            .set_stage(upload_id, UploadStage::AiAnalysis, "scoring conversation days")
            .await;
        let summary = self.scheduler.run_jobs(upload_id, jobs, token).await;
        self.tracker
            .set_processed_conversations(upload_id, summary.processed_conversation_ids.len() as u64)
            .await;

        if token.is_cancelled() {
            self.tracker.cancel(upload_id).await;
            return Ok(());
        }

        // Stage: finalization, metric cache refresh and processed marks
        self.tracker
            .set_stage(upload_id, UploadStage::Finalizing, "refreshing metrics")
            .await;
        let snapshot = self.db.compute_metric_snapshot().await?;
        self.db.replace_metrics(&snapshot).await?;

        let processed: Vec<(String, i64)> = ingested
            .iter()
            .map(|chat| (chat.chat_id.clone(), chat.message_count))
            .collect();
        self.db.mark_processed(&processed).await?;

        self.tracker.complete(upload_id).await;
        Ok(())
    }

    /// Run the validator over every chat, recording filter counters.
    /// Chats whose messages are all filtered drop out here.
    async fn validate_chats(
        &self,
        upload_id: &str,
        chats: UploadPayload,
    ) -> Vec<(String, Vec<crate::ingest::validator::ValidatedMessage>)> {
        let mut filtered_autoresponses: u64 = 0;
        let mut filtered_invalid: u64 = 0;
        let mut validated = Vec::new();

        for (chat_id, raw_messages) in chats {
            let mut accepted = Vec::with_capacity(raw_messages.len());
            for raw in &raw_messages {
                match self.validator.validate(raw) {
                    Ok(message) => accepted.push(message),
                    Err(RejectReason::AutoResponse) => filtered_autoresponses += 1,
                    Err(RejectReason::Invalid(reason)) => {
                        filtered_invalid += 1;
                        warn!(%chat_id, reason, "Filtered invalid message");
                    }
                }
            }
            if accepted.is_empty() {
                info!(%chat_id, "Chat skipped: every message filtered");
            } else {
                validated.push((chat_id, accepted));
            }
        }

        if filtered_autoresponses > 0 {
            self.tracker
                .record_filtered_autoresponses(upload_id, filtered_autoresponses)
                .await;
        }
        if filtered_invalid > 0 {
            self.tracker
                .record_filtered_invalid(upload_id, filtered_invalid)
                .await;
        }

        validated
    }

    /// Drop chats already processed in a previous upload, then group the
    /// survivors by day (C2)
    async fn filter_processed(
        &self,
        validated: Vec<(String, Vec<crate::ingest::validator::ValidatedMessage>)>,
        force_reprocess: bool,
    ) -> AppResult<Vec<ChatGroup>> {
        let mut groups = Vec::with_capacity(validated.len());
        for (chat_id, messages) in validated {
            if !force_reprocess && self.db.is_chat_processed(&chat_id).await? {
                info!(%chat_id, "Skipping already processed chat");
                continue;
            }
            if let Some(group) = group_chat(chat_id, messages) {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Build work units from the seeded rows and pack them into jobs (C4)
    async fn create_jobs(
        &self,
        upload_id: &str,
        groups: Vec<ChatGroup>,
        ingested: &[IngestedChat],
    ) -> AppResult<Vec<JobWork>> {
        let mut units = Vec::new();
        for (group, chat) in groups.into_iter().zip(ingested) {
            for (day, seeded) in group.days.into_iter().zip(&chat.days) {
                debug_assert_eq!(day.analysis_date, seeded.analysis_date);
                units.push(WorkUnit::new(
                    seeded.daily_analysis_id,
                    chat.conversation_id,
                    chat.chat_id.clone(),
                    seeded.analysis_date,
                    day.messages,
                ));
            }
        }

        let batches = pack_into_batches(
            units,
            self.config.pipeline.max_tokens_per_job,
            self.config.pipeline.batch_size,
        );

        let mut jobs = Vec::with_capacity(batches.len());
        for batch in batches {
            let daily_ids: Vec<i64> = batch.iter().map(|u| u.daily_analysis_id).collect();
            let job_id = self.db.create_job(upload_id, &daily_ids).await?;
            jobs.push(JobWork {
                job_id,
                units: batch,
            });
        }

        info!(upload_id, jobs = jobs.len(), "Jobs created");
        Ok(jobs)
    }
}
