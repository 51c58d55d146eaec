// ABOUTME: PowerPulse server binary: configuration, database, provider, and HTTP serving
// ABOUTME: Graceful shutdown cancels in-flight uploads before exit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! PowerPulse Analytics server entrypoint

use std::sync::Arc;

use anyhow::Result;
use tower_http::cors::CorsLayer;
use tracing::info;

use powerpulse::config::environment::ServerConfig;
use powerpulse::database::Database;
use powerpulse::llm::AnalysisProvider;
use powerpulse::orchestrator::UploadOrchestrator;
use powerpulse::progress::ProgressTracker;
use powerpulse::routes::{api_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env()?;
    config.logging.init()?;

    let db = Database::new(&config.database_url).await?;
    info!(database_url = %config.database_url, "Database initialized");

    let provider = Arc::new(AnalysisProvider::from_config(&config.ai)?);
    info!(provider = provider.name(), "LLM provider initialized");

    let tracker = ProgressTracker::new();
    let config = Arc::new(config);
    let orchestrator = Arc::new(UploadOrchestrator::new(
        db.clone(),
        provider,
        tracker.clone(),
        Arc::clone(&config),
    ));

    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        db,
        tracker,
        max_file_size: config.max_file_size,
    };

    // Dashboard origin is configured at the proxy; the API itself is open
    let app = api_router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "PowerPulse Analytics listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(orchestrator))
        .await?;

    Ok(())
}

/// Wait for Ctrl-C, then cancel every in-flight upload
async fn shutdown_signal(orchestrator: Arc<UploadOrchestrator<AnalysisProvider>>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received; cancelling in-flight uploads");
    orchestrator.shutdown().await;
}
