// ABOUTME: Progress polling routes: per-upload snapshots, active listing, and cancellation
// ABOUTME: Serves the C9 tracker state to the dashboard
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Progress routes

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::errors::{AppError, AppResult};
use crate::progress::ProgressSnapshot;
use crate::routes::AppState;

/// Listing of all active uploads
#[derive(Debug, Serialize)]
pub struct ActiveUploadsResponse {
    /// Snapshots keyed by upload id
    pub active_uploads: Vec<ProgressSnapshot>,
    /// Count of active uploads
    pub total_active: usize,
}

/// Progress routes implementation
pub struct ProgressRoutes;

impl ProgressRoutes {
    /// Create the progress routes
    pub fn routes() -> Router<AppState> {
        Router::new()
            .route("/progress", get(all_active))
            .route("/progress/{upload_id}", get(one_upload).delete(cancel_upload))
    }
}

/// Snapshot one upload's progress
async fn one_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> AppResult<Json<ProgressSnapshot>> {
    state
        .tracker
        .snapshot(&upload_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Upload {upload_id}")))
}

/// List every upload still pending or processing
async fn all_active(State(state): State<AppState>) -> Json<ActiveUploadsResponse> {
    let active = state.tracker.active().await;
    let total_active = active.len();
    Json(ActiveUploadsResponse {
        active_uploads: active,
        total_active,
    })
}

/// Cancel an active upload
async fn cancel_upload(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state
        .tracker
        .snapshot(&upload_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("Upload {upload_id}")))?;

    if snapshot.status.is_terminal() {
        return Err(AppError::invalid_input(format!(
            "Upload {upload_id} is not active"
        )));
    }

    state.orchestrator.cancel_upload(&upload_id).await;

    Ok(Json(serde_json::json!({
        "message": format!("Upload {upload_id} has been cancelled"),
    })))
}
