// ABOUTME: Upload acceptance routes: multipart JSON intake and service limits
// ABOUTME: Returns 202 with an upload id; all processing happens in the background
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Upload routes
//!
//! `POST /api/upload-json` accepts `multipart/form-data` with a `file`
//! part (grouped-chats JSON) and an optional `force_reprocess` flag (form
//! part or query parameter). The response is `202 Accepted` with the
//! upload id; progress is polled separately.

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::routes::AppState;

/// Upload acceptance response, returned with `202 Accepted`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Identifier for polling progress
    pub upload_id: String,
    /// Always true: the upload was accepted, not yet processed
    pub success: bool,
    /// Processing has not started when this response is sent
    pub conversations_processed: u64,
    /// Processing has not started when this response is sent
    pub messages_processed: u64,
}

/// Query parameters accepted by the upload endpoint
#[derive(Debug, Deserialize, Default)]
pub struct UploadQuery {
    /// Reprocess chat ids that already completed a previous upload
    #[serde(default)]
    pub force_reprocess: bool,
}

/// Upload routes implementation
pub struct UploadRoutes;

impl UploadRoutes {
    /// Create the upload routes
    pub fn routes() -> Router<AppState> {
        Router::new()
            .route("/upload-json", post(upload_json))
            .route("/upload-status", get(upload_status))
    }
}

/// Accept a grouped-chats JSON upload and schedule background processing
async fn upload_json(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let mut file: Option<Vec<u8>> = None;
    let mut force_reprocess = query.force_reprocess;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("failed to read file part: {e}")))?;
                file = Some(bytes.to_vec());
            }
            Some("force_reprocess") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("failed to read form field: {e}")))?;
                force_reprocess = text == "true" || text == "1";
            }
            _ => {}
        }
    }

    let payload = file.ok_or_else(|| AppError::invalid_input("file part is required"))?;
    if payload.is_empty() {
        return Err(AppError::invalid_input("file is empty"));
    }

    let accepted = state
        .orchestrator
        .accept_upload(&payload, force_reprocess)
        .await?;
    info!(upload_id = %accepted.upload_id, bytes = payload.len(), "Upload scheduled");

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            upload_id: accepted.upload_id,
            success: true,
            conversations_processed: 0,
            messages_processed: 0,
        }),
    ))
}

/// Service limits and readiness for the upload endpoint
async fn upload_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "max_file_size_mb": state.max_file_size as f64 / (1024.0 * 1024.0),
        "accepted_formats": [".json"],
        "status": "ready",
    }))
}
