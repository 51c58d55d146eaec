// ABOUTME: Message validator: accepts/rejects raw records and normalizes timestamps and direction
// ABOUTME: Filters the configured auto-reply sentence and counts rejection reasons per upload
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Message Validator
//!
//! Accepts a raw upload record and yields either a normalized message or a
//! rejection reason. Rejections are counted per upload under
//! `filtered_autoresponses` (the known auto-reply) or `filtered_invalid`
//! (everything else). All other content is accepted, including empty
//! strings.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::config::environment::AutoResponseConfig;
use crate::constants::defaults;
use crate::models::{AgentInfo, MessageDirection};

/// Upload payload field names (source-system convention, upper-case)
const FIELD_CONTENT: &str = "MESSAGE_CONTENT";
const FIELD_DIRECTION: &str = "DIRECTION";
const FIELD_TIMESTAMP: &str = "SOCIAL_CREATE_TIME";
const FIELD_AGENT_USERNAME: &str = "AGENT_USERNAME";
const FIELD_AGENT_EMAIL: &str = "AGENT_EMAIL";

/// A raw record that passed validation, normalized for the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMessage {
    /// Message body (may be empty)
    pub message_content: String,
    /// Normalized direction
    pub direction: MessageDirection,
    /// Normalized UTC timestamp
    pub social_create_time: DateTime<Utc>,
    /// Agent identity when the record carried one
    pub agent_info: Option<AgentInfo>,
}

/// Why a raw record was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Content equals the configured auto-reply sentence
    AutoResponse,
    /// Structurally invalid record
    Invalid(&'static str),
}

/// Validates raw records against the configured auto-reply filter
#[derive(Debug, Clone)]
pub struct MessageValidator {
    autoresponse: AutoResponseConfig,
}

impl MessageValidator {
    /// Create a validator with the given auto-reply configuration
    #[must_use]
    pub const fn new(autoresponse: AutoResponseConfig) -> Self {
        Self { autoresponse }
    }

    /// Validate and normalize one raw record.
    ///
    /// # Errors
    ///
    /// Returns [`RejectReason::Invalid`] when the content is not a string
    /// (including null), the direction is unknown, or the timestamp is
    /// missing or unparseable; [`RejectReason::AutoResponse`] when the
    /// content matches the configured auto-reply sentence (exact,
    /// case-sensitive by default).
    pub fn validate(&self, raw: &Value) -> Result<ValidatedMessage, RejectReason> {
        let record = raw
            .as_object()
            .ok_or(RejectReason::Invalid("record is not an object"))?;

        let content = record
            .get(FIELD_CONTENT)
            .and_then(Value::as_str)
            .ok_or(RejectReason::Invalid("message_content is not a string"))?;

        let direction = record
            .get(FIELD_DIRECTION)
            .and_then(Value::as_str)
            .and_then(MessageDirection::parse)
            .ok_or(RejectReason::Invalid("unknown direction"))?;

        let timestamp = record
            .get(FIELD_TIMESTAMP)
            .and_then(Value::as_str)
            .ok_or(RejectReason::Invalid("social_create_time missing"))?;
        let social_create_time =
            parse_timestamp(timestamp).ok_or(RejectReason::Invalid("unparseable timestamp"))?;

        if self.is_autoresponse(content) {
            return Err(RejectReason::AutoResponse);
        }

        Ok(ValidatedMessage {
            message_content: content.to_owned(),
            direction,
            social_create_time,
            agent_info: extract_agent_info(record),
        })
    }

    /// Auto-reply match: exact sentence by default, substring on `*977#`
    /// when the configuration toggle is enabled
    fn is_autoresponse(&self, content: &str) -> bool {
        if self.autoresponse.substring_match {
            content.contains(defaults::AUTORESPONSE_SUBSTRING)
        } else {
            content == self.autoresponse.sentence
        }
    }
}

/// Parse an ISO-8601 timestamp to UTC.
///
/// Accepts RFC 3339 (with offset or `Z`) and the offset-less
/// `YYYY-MM-DDTHH:MM:SS[.f]` / `YYYY-MM-DD HH:MM:SS` forms the source
/// system emits, interpreting the latter as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Pull optional agent identity fields out of the record
fn extract_agent_info(record: &serde_json::Map<String, Value>) -> Option<AgentInfo> {
    let info = AgentInfo {
        username: record
            .get(FIELD_AGENT_USERNAME)
            .and_then(Value::as_str)
            .map(str::to_owned),
        email: record
            .get(FIELD_AGENT_EMAIL)
            .and_then(Value::as_str)
            .map(str::to_owned),
    };
    if info.is_empty() {
        None
    } else {
        Some(info)
    }
}
