// ABOUTME: Main library entry point for the PowerPulse analytics backend
// ABOUTME: Exposes the ingestion pipeline, LLM scoring, CSI calculation, and HTTP routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

#![deny(unsafe_code)]

//! # PowerPulse Analytics
//!
//! PowerPulse ingests customer-service chat transcripts (grouped by chat
//! identifier), asks an LLM provider to score each conversation-day across
//! eight micro-metrics, derives four weighted pillar scores and a composite
//! Customer Satisfaction Index (CSI), persists results in SQLite, and serves
//! aggregated analytics to a dashboard.
//!
//! ## Pipeline
//!
//! 1. **Upload acceptor** returns an upload id synchronously and schedules
//!    all work on a background task ([`orchestrator`]).
//! 2. **Preprocessing** validates messages and groups them by conversation
//!    and UTC calendar day ([`ingest`]).
//! 3. **Batching** packs per-day work units into token-bounded jobs
//!    ([`analysis::batcher`]) which a bounded-concurrency scheduler drives
//!    through the LLM ([`jobs`], [`llm`]).
//! 4. **Deterministic metrics** (response/handling times, pillar scores,
//!    CSI) are computed locally ([`analysis`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use powerpulse::config::environment::ServerConfig;
//! use powerpulse::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("PowerPulse configured on port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Pillar/CSI math, token batching, and deterministic time metrics
pub mod analysis;

/// Configuration management and environment loading
pub mod config;

/// Shared constants: HTTP status codes, defaults, service names
pub mod constants;

/// SQLite persistence gateway
pub mod database;

/// Centralized error handling and `HTTP` error mapping
pub mod errors;

/// Message validation and conversation/day grouping
pub mod ingest;

/// Job scheduling: bounded concurrency, retries, cancellation
pub mod jobs;

/// LLM provider adapters (Gemini, `OpenAI`-compatible)
pub mod llm;

/// Logging configuration and structured logging setup
pub mod logging;

/// Domain records: conversations, messages, daily analyses, jobs
pub mod models;

/// Upload orchestration: the end-to-end background pipeline
pub mod orchestrator;

/// Per-upload progress tracking
pub mod progress;

/// `HTTP` route handlers
pub mod routes;
