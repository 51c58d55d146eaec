// ABOUTME: Deterministic time metrics from message timestamps within one day
// ABOUTME: First response, average response, and total handling time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Time Metrics
//!
//! Computed locally after the LLM returns, never requested from the model:
//!
//! - `first_response_time` (seconds): gap between the first customer
//!   message and the first agent message that follows it in the same day.
//!   Null if either side is absent.
//! - `avg_response_time` (seconds): mean gap over customer→agent reply
//!   pairs. The earliest unanswered customer message anchors the gap and
//!   the anchor resets once an agent replies, so back-to-back agent
//!   messages contribute a single pair. Null with no pairs.
//! - `total_handling_time` (minutes): span between the day's first and
//!   last message. Null with fewer than two messages.

use serde::{Deserialize, Serialize};

use crate::ingest::validator::ValidatedMessage;
use crate::models::MessageDirection;

/// The three deterministic time metrics for one conversation-day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TimeMetrics {
    /// Seconds until the first agent reply
    pub first_response_time: Option<f64>,
    /// Mean seconds between a customer message and the agent reply
    pub avg_response_time: Option<f64>,
    /// Minutes between the day's first and last message
    pub total_handling_time: Option<f64>,
}

/// Compute time metrics over one day's messages, assumed timestamp-sorted.
#[must_use]
pub fn compute_time_metrics(messages: &[ValidatedMessage]) -> TimeMetrics {
    if messages.is_empty() {
        return TimeMetrics::default();
    }

    let total_handling_time = if messages.len() >= 2 {
        let span = messages[messages.len() - 1].social_create_time - messages[0].social_create_time;
        Some(span.num_milliseconds() as f64 / 60_000.0)
    } else {
        None
    };

    let mut first_response_time = None;
    let mut response_times: Vec<f64> = Vec::new();
    let mut pending_customer = None;

    for message in messages {
        match message.direction {
            MessageDirection::ToCompany => {
                if pending_customer.is_none() {
                    pending_customer = Some(message.social_create_time);
                }
            }
            MessageDirection::ToClient => {
                if let Some(asked_at) = pending_customer.take() {
                    let gap = (message.social_create_time - asked_at).num_milliseconds() as f64
                        / 1_000.0;
                    if first_response_time.is_none() {
                        first_response_time = Some(gap);
                    }
                    response_times.push(gap);
                }
            }
        }
    }

    let avg_response_time = if response_times.is_empty() {
        None
    } else {
        Some(response_times.iter().sum::<f64>() / response_times.len() as f64)
    };

    TimeMetrics {
        first_response_time,
        avg_response_time,
        total_handling_time,
    }
}
