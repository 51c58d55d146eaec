// ABOUTME: Deterministic analysis stage: token batching, time metrics, and CSI math
// ABOUTME: Everything computed locally, without the LLM
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Deterministic analysis
//!
//! [`batcher`] packs per-day work units into token-bounded jobs;
//! [`time_metrics`] derives response/handling times from message
//! timestamps; [`csi`] combines micro-metrics into pillar scores and the
//! weighted Customer Satisfaction Index.

/// Token estimation and first-fit job packing
pub mod batcher;

/// Pillar scores and the composite CSI
pub mod csi;

/// First/average response and handling time
pub mod time_metrics;

pub use batcher::{estimate_tokens, pack_into_batches, WorkUnit};
pub use csi::{compute_csi, compute_pillars, PillarScores, TimeThresholds};
pub use time_metrics::{compute_time_metrics, TimeMetrics};
