// ABOUTME: Job execution layer: cooperative cancellation and the bounded-concurrency scheduler
// ABOUTME: Drives LLM jobs with retries, failure isolation, and per-upload progress
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Job scheduling
//!
//! A single background executor per process dispatches jobs in creation
//! order through a counting semaphore. Every suspension point (permit
//! acquisition, inter-call delay, LLM I/O, database I/O) observes the
//! upload's cancellation token.

/// Explicit cancellation tokens and the per-upload registry
pub mod cancel;

/// The bounded-concurrency job scheduler
pub mod scheduler;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use scheduler::{JobRunSummary, JobScheduler, JobWork, RetryPolicy};
