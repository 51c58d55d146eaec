// ABOUTME: Health check route handlers for service monitoring
// ABOUTME: Provides liveness endpoints for load balancers and the dashboard
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Health check routes

use axum::routing::get;
use axum::{Json, Router};

use crate::constants::service_names;
use crate::routes::AppState;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    pub fn routes() -> Router<AppState> {
        async fn health_handler() -> Json<serde_json::Value> {
            Json(serde_json::json!({
                "status": "healthy",
                "service": service_names::POWERPULSE,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
        }

        Router::new().route("/health", get(health_handler))
    }
}
