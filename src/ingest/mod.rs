// ABOUTME: Ingestion stage: raw message validation and conversation/day grouping
// ABOUTME: Everything between the parsed upload payload and the persistence gateway
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! Upload preprocessing
//!
//! [`validator`] normalizes raw records or rejects them with a counted
//! reason; [`grouper`] splits each accepted chat into per-UTC-day units,
//! the grain at which the LLM scores conversations.

/// Conversation and calendar-day grouping
pub mod grouper;

/// Raw message validation and normalization
pub mod validator;

pub use grouper::{group_chat, ChatGroup, DayUnit};
pub use validator::{MessageValidator, RejectReason, ValidatedMessage};
