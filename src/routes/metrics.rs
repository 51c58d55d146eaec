// ABOUTME: Cached CSI metrics endpoint for dashboard loading
// ABOUTME: Serves the Metric cache, computing a fresh snapshot when the cache is empty
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Metrics routes

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::{
    METRIC_AVG_EFFECTIVENESS, METRIC_AVG_EFFICIENCY, METRIC_AVG_EFFORT, METRIC_AVG_EMPATHY,
    METRIC_OVERALL_CSI, METRIC_TOTAL_CONVERSATIONS, METRIC_TOTAL_DAYS,
};
use crate::errors::{AppError, AppResult};
use crate::models::Metric;
use crate::routes::AppState;

/// Aggregated CSI metrics for the dashboard
#[derive(Debug, Serialize)]
pub struct CsiMetricsResponse {
    /// System-level CSI: mean across all scored days
    pub overall_csi_score: f64,
    /// Mean effectiveness pillar
    pub avg_effectiveness_score: f64,
    /// Mean effort pillar
    pub avg_effort_score: f64,
    /// Mean efficiency pillar
    pub avg_efficiency_score: f64,
    /// Mean empathy pillar
    pub avg_empathy_score: f64,
    /// Scored conversation-days in the snapshot
    pub total_days_analyzed: u64,
    /// Ingested conversations
    pub total_conversations: u64,
    /// When the snapshot was computed
    pub last_updated: DateTime<Utc>,
}

/// Metrics routes implementation
pub struct MetricsRoutes;

impl MetricsRoutes {
    /// Create the metrics routes
    pub fn routes() -> Router<AppState> {
        Router::new().route("/metrics", get(csi_metrics))
    }
}

/// Serve the cached snapshot, computing one when the cache is empty
async fn csi_metrics(State(state): State<AppState>) -> AppResult<Json<CsiMetricsResponse>> {
    let mut cached = state.db.get_metrics().await?;

    if cached.is_empty() {
        let snapshot = state.db.compute_metric_snapshot().await?;
        state.db.replace_metrics(&snapshot).await?;
        cached = snapshot;
    }

    Ok(Json(response_from(&cached)?))
}

fn response_from(metrics: &[Metric]) -> AppResult<CsiMetricsResponse> {
    let value = |name: &str| {
        metrics
            .iter()
            .find(|m| m.metric_name == name)
            .map_or(0.0, |m| m.metric_value)
    };
    let last_updated = metrics
        .iter()
        .map(|m| m.calculated_at)
        .max()
        .ok_or_else(|| AppError::internal("metric snapshot is empty"))?;

    Ok(CsiMetricsResponse {
        overall_csi_score: value(METRIC_OVERALL_CSI),
        avg_effectiveness_score: value(METRIC_AVG_EFFECTIVENESS),
        avg_effort_score: value(METRIC_AVG_EFFORT),
        avg_efficiency_score: value(METRIC_AVG_EFFICIENCY),
        avg_empathy_score: value(METRIC_AVG_EMPATHY),
        total_days_analyzed: value(METRIC_TOTAL_DAYS) as u64,
        total_conversations: value(METRIC_TOTAL_CONVERSATIONS) as u64,
        last_updated,
    })
}
