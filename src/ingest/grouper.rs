// ABOUTME: Groups validated messages by chat id and UTC calendar day
// ABOUTME: Derives per-conversation counts and first/last message times
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Grouper
//!
//! Splits a chat's validated messages into per-UTC-day units, the grain at
//! which daily analyses are scored. Within a day, messages are ordered by
//! `social_create_time` ascending with ties broken by insertion order.

use chrono::{DateTime, NaiveDate, Utc};

use crate::ingest::validator::ValidatedMessage;
use crate::models::MessageDirection;

/// One (chat, UTC date) unit of messages to be scored together
#[derive(Debug, Clone)]
pub struct DayUnit {
    /// UTC calendar date of the messages
    pub analysis_date: NaiveDate,
    /// Messages of this day, timestamp order
    pub messages: Vec<ValidatedMessage>,
}

/// A chat's messages grouped by day, with conversation-level aggregates
#[derive(Debug, Clone)]
pub struct ChatGroup {
    /// External chat identifier
    pub chat_id: String,
    /// Total accepted messages
    pub total_messages: i64,
    /// Messages with direction `to_company`
    pub customer_messages: i64,
    /// Messages with direction `to_client`
    pub agent_messages: i64,
    /// Earliest message timestamp
    pub first_message_time: DateTime<Utc>,
    /// Latest message timestamp
    pub last_message_time: DateTime<Utc>,
    /// Per-day units in chronological order
    pub days: Vec<DayUnit>,
}

/// Group a chat's validated messages by UTC calendar day.
///
/// Returns `None` when the chat has no accepted messages (a fully filtered
/// chat is skipped, not persisted).
#[must_use]
pub fn group_chat(chat_id: impl Into<String>, mut messages: Vec<ValidatedMessage>) -> Option<ChatGroup> {
    if messages.is_empty() {
        return None;
    }

    // Stable sort keeps insertion order for identical timestamps
    messages.sort_by_key(|m| m.social_create_time);

    let total_messages = messages.len() as i64;
    let customer_messages = messages
        .iter()
        .filter(|m| m.direction == MessageDirection::ToCompany)
        .count() as i64;
    let agent_messages = total_messages - customer_messages;
    let first_message_time = messages.first()?.social_create_time;
    let last_message_time = messages.last()?.social_create_time;

    let mut days: Vec<DayUnit> = Vec::new();
    for message in messages {
        let date = message.social_create_time.date_naive();
        match days.last_mut() {
            Some(day) if day.analysis_date == date => day.messages.push(message),
            _ => days.push(DayUnit {
                analysis_date: date,
                messages: vec![message],
            }),
        }
    }

    Some(ChatGroup {
        chat_id: chat_id.into(),
        total_messages,
        customer_messages,
        agent_messages,
        first_message_time,
        last_message_time,
        days,
    })
}
