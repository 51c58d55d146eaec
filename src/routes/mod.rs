// ABOUTME: HTTP route assembly and shared application state for the API surface
// ABOUTME: Wires upload, progress, metrics, and health endpoints into one axum Router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! HTTP routes
//!
//! The transport boundary over the core pipeline: upload acceptance,
//! progress polling, the cached metrics snapshot, and health checks.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::database::Database;
use crate::llm::AnalysisProvider;
use crate::orchestrator::UploadOrchestrator;
use crate::progress::ProgressTracker;

/// Health check endpoints
pub mod health;

/// Cached metrics snapshot endpoint
pub mod metrics;

/// Progress polling and upload cancellation endpoints
pub mod progress;

/// Upload acceptance endpoints
pub mod upload;

/// Multipart framing allowance on top of the configured file size cap
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state handed to every route handler
#[derive(Clone)]
pub struct AppState {
    /// The upload orchestrator over the configured LLM provider
    pub orchestrator: Arc<UploadOrchestrator<AnalysisProvider>>,
    /// Persistence gateway for read-side endpoints
    pub db: Database,
    /// Progress registry polled by the dashboard
    pub tracker: ProgressTracker,
    /// Upload size guardrail in bytes
    pub max_file_size: usize,
}

/// Assemble the full API router
#[must_use]
pub fn api_router(state: AppState) -> Router {
    let body_limit = state.max_file_size + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .nest("/api", upload::UploadRoutes::routes())
        .nest("/api", progress::ProgressRoutes::routes())
        .nest("/api", metrics::MetricsRoutes::routes())
        .merge(health::HealthRoutes::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
