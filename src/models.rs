// ABOUTME: Core domain records for conversations, messages, daily analyses, jobs, and metrics
// ABOUTME: Defines direction and status enums plus the micro-metric score types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Data Models
//!
//! Domain structures shared between the ingestion pipeline, the scheduler,
//! and the persistence gateway. A `Conversation` exclusively owns its
//! `Message`s and `DailyAnalysis` rows; a `Job` shares daily analyses by
//! weak reference through the `job_daily_analyses` link table.

use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a chat message relative to the company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// Customer → company
    ToCompany,
    /// Company agent → customer
    ToClient,
}

impl MessageDirection {
    /// Wire/database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToCompany => "to_company",
            Self::ToClient => "to_client",
        }
    }

    /// Parse the wire representation; anything else is invalid
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "to_company" => Some(Self::ToCompany),
            "to_client" => Some(Self::ToClient),
            _ => None,
        }
    }
}

impl Display for MessageDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Structured agent identity attached to outbound messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentInfo {
    /// Agent username, if the source system provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Agent email, if the source system provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AgentInfo {
    /// True when neither field is populated
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }
}

/// Conversation-level aggregate, unique by `chat_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Database identifier
    pub id: i64,
    /// External chat identifier (unique)
    pub chat_id: String,
    /// Customer display name when known
    pub customer_name: Option<String>,
    /// Total ingested messages
    pub total_messages: i64,
    /// Messages with direction `to_company`
    pub customer_messages: i64,
    /// Messages with direction `to_client`
    pub agent_messages: i64,
    /// Earliest message timestamp
    pub first_message_time: Option<DateTime<Utc>>,
    /// Latest message timestamp
    pub last_message_time: Option<DateTime<Utc>>,
    /// Distinct topics surfaced by the LLM across this conversation's days
    pub common_topics: Vec<String>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

/// A stored chat message, append-only under its conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Database identifier
    pub id: i64,
    /// External chat identifier
    pub chat_id: String,
    /// Owning conversation
    pub conversation_id: i64,
    /// Message body (may be empty)
    pub message_content: String,
    /// Message direction
    pub direction: MessageDirection,
    /// Message timestamp (UTC)
    pub social_create_time: DateTime<Utc>,
    /// Agent identity for outbound messages
    pub agent_info: Option<AgentInfo>,
}

/// The five AI-derived micro-metrics for one conversation-day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyScores {
    /// Customer sentiment, 0-10
    pub sentiment_score: f64,
    /// Sentiment change start→end of day, -5..+5
    pub sentiment_shift: f64,
    /// Degree of issue resolution, 0-10
    pub resolution_achieved: f64,
    /// First-contact-resolution likelihood, 0-10
    pub fcr_score: f64,
    /// Customer Effort Score, 1-7 (lower is better)
    pub ces: f64,
}

impl DailyScores {
    /// Neutral fallback substituted when LLM analysis fails
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            sentiment_score: 5.0,
            sentiment_shift: 0.0,
            resolution_achieved: 5.0,
            fcr_score: 5.0,
            ces: 4.0,
        }
    }

    /// True when every score is inside its documented range
    #[must_use]
    pub fn in_range(&self) -> bool {
        (0.0..=10.0).contains(&self.sentiment_score)
            && (-5.0..=5.0).contains(&self.sentiment_shift)
            && (0.0..=10.0).contains(&self.resolution_achieved)
            && (0.0..=10.0).contains(&self.fcr_score)
            && (1.0..=7.0).contains(&self.ces)
    }
}

/// One scored (conversation, UTC date) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyAnalysis {
    /// Database identifier
    pub id: i64,
    /// Owning conversation
    pub conversation_id: i64,
    /// UTC calendar date of the day's messages
    pub analysis_date: NaiveDate,
    /// Customer sentiment, 0-10
    pub sentiment_score: Option<f64>,
    /// Sentiment change start→end of day, -5..+5
    pub sentiment_shift: Option<f64>,
    /// Degree of issue resolution, 0-10
    pub resolution_achieved: Option<f64>,
    /// First-contact-resolution likelihood, 0-10
    pub fcr_score: Option<f64>,
    /// Customer Effort Score, 1-7
    pub ces: Option<f64>,
    /// Seconds until the first agent reply
    pub first_response_time: Option<f64>,
    /// Mean seconds between customer message and agent reply
    pub avg_response_time: Option<f64>,
    /// Minutes between the day's first and last message
    pub total_handling_time: Option<f64>,
    /// Effectiveness pillar, 0-10
    pub effectiveness_score: Option<f64>,
    /// Effort pillar, 0-10
    pub effort_score: Option<f64>,
    /// Efficiency pillar, 0-10
    pub efficiency_score: Option<f64>,
    /// Empathy pillar, 0-10
    pub empathy_score: Option<f64>,
    /// Composite Customer Satisfaction Index, 0-100
    pub csi_score: Option<f64>,
    /// Failure marker (`analysis_failed`) when scoring fell back
    pub error: Option<String>,
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet dispatched
    Pending,
    /// Dispatched to a worker
    InProgress,
    /// All units scored and persisted
    Completed,
    /// Scoring or persistence failed (fallbacks may still be stored)
    Failed,
}

impl JobStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// True for `completed` and `failed`
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One batch of daily analyses sent to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Database identifier; dispatch is FIFO by this id
    pub id: i64,
    /// Owning upload
    pub upload_id: String,
    /// Lifecycle state
    pub status: JobStatus,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Terminal-state time
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-item outcomes and/or error details
    pub result: Option<serde_json::Value>,
}

/// Dedup marker: a chat id that completed an upload successfully
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedChat {
    /// External chat identifier (unique)
    pub chat_id: String,
    /// When the owning upload completed
    pub processed_at: DateTime<Utc>,
    /// Messages ingested for this chat
    pub message_count: i64,
}

/// Cached aggregate metric for dashboard loading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    /// Cache key (unique)
    pub metric_name: String,
    /// Numeric value
    pub metric_value: f64,
    /// Additional context
    pub metric_metadata: Option<serde_json::Value>,
    /// When the snapshot was computed
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trip() {
        assert_eq!(MessageDirection::parse("to_company"), Some(MessageDirection::ToCompany));
        assert_eq!(MessageDirection::parse("to_client"), Some(MessageDirection::ToClient));
        assert_eq!(MessageDirection::parse("TO_COMPANY"), None);
        assert_eq!(MessageDirection::ToClient.as_str(), "to_client");
    }

    #[test]
    fn fallback_scores_are_in_range() {
        assert!(DailyScores::fallback().in_range());
    }

    #[test]
    fn out_of_range_scores_detected() {
        let mut scores = DailyScores::fallback();
        scores.ces = 0.5;
        assert!(!scores.in_range());

        let mut scores = DailyScores::fallback();
        scores.sentiment_shift = 6.0;
        assert!(!scores.in_range());
    }

    #[test]
    fn job_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }
}
