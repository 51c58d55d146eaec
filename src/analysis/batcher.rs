// ABOUTME: Token estimator and first-fit batcher packing day units into LLM jobs
// ABOUTME: Enforces the per-job token budget and the hard unit-count cap
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Token Estimator & Batcher
//!
//! The token estimate for a work unit is `ceil(total_character_length / 4)`
//! over the concatenation of its messages. Packing is first-fit, walking
//! units in the order the grouper produced them; a unit whose individual
//! estimate exceeds the budget is placed in a job by itself (the LLM may
//! still reject it; such failure is reported, not fatal).

use chrono::NaiveDate;
use tracing::debug;

use crate::ingest::validator::ValidatedMessage;

/// One per-day unit of LLM work, tied to its seeded daily-analysis row
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// The daily-analysis row this unit will update
    pub daily_analysis_id: i64,
    /// Owning conversation row
    pub conversation_id: i64,
    /// External chat identifier (used in the prompt)
    pub chat_id: String,
    /// UTC calendar date of the unit
    pub analysis_date: NaiveDate,
    /// Messages of this day, timestamp order
    pub messages: Vec<ValidatedMessage>,
    /// Estimated prompt tokens for this unit
    pub token_estimate: u64,
}

impl WorkUnit {
    /// Build a work unit, estimating its token cost
    #[must_use]
    pub fn new(
        daily_analysis_id: i64,
        conversation_id: i64,
        chat_id: impl Into<String>,
        analysis_date: NaiveDate,
        messages: Vec<ValidatedMessage>,
    ) -> Self {
        let token_estimate = estimate_tokens(&messages);
        Self {
            daily_analysis_id,
            conversation_id,
            chat_id: chat_id.into(),
            analysis_date,
            messages,
            token_estimate,
        }
    }
}

/// Estimate prompt tokens for a set of messages: `ceil(chars / 4)`
#[must_use]
pub fn estimate_tokens(messages: &[ValidatedMessage]) -> u64 {
    let chars: u64 = messages
        .iter()
        .map(|m| m.message_content.chars().count() as u64)
        .sum();
    chars.div_ceil(4)
}

/// Pack work units into batches subject to a token budget and a unit cap.
///
/// First-fit: each unit lands in the first open batch with room for both
/// its tokens and one more unit. Oversized units become singleton batches.
/// An empty input produces zero batches.
#[must_use]
pub fn pack_into_batches(
    units: Vec<WorkUnit>,
    max_tokens_per_job: u64,
    batch_size: usize,
) -> Vec<Vec<WorkUnit>> {
    let mut batches: Vec<Vec<WorkUnit>> = Vec::new();
    let mut batch_tokens: Vec<u64> = Vec::new();

    for unit in units {
        if unit.token_estimate > max_tokens_per_job {
            debug!(
                chat_id = %unit.chat_id,
                analysis_date = %unit.analysis_date,
                tokens = unit.token_estimate,
                "Oversized unit placed in its own job"
            );
            batches.push(vec![unit]);
            batch_tokens.push(u64::MAX);
            continue;
        }

        let slot = batches
            .iter()
            .zip(batch_tokens.iter())
            .position(|(batch, &tokens)| {
                tokens != u64::MAX
                    && tokens + unit.token_estimate <= max_tokens_per_job
                    && batch.len() < batch_size
            });

        match slot {
            Some(i) => {
                batch_tokens[i] += unit.token_estimate;
                batches[i].push(unit);
            }
            None => {
                batch_tokens.push(unit.token_estimate);
                batches.push(vec![unit]);
            }
        }
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::models::MessageDirection;

    fn unit(id: i64, content_len: usize) -> WorkUnit {
        let message = ValidatedMessage {
            message_content: "x".repeat(content_len),
            direction: MessageDirection::ToCompany,
            social_create_time: DateTime::parse_from_rfc3339("2025-08-26T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            agent_info: None,
        };
        WorkUnit::new(id, 1, "C1", "2025-08-26".parse().unwrap(), vec![message])
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(unit(1, 0).token_estimate, 0);
        assert_eq!(unit(1, 1).token_estimate, 1);
        assert_eq!(unit(1, 4).token_estimate, 1);
        assert_eq!(unit(1, 5).token_estimate, 2);
        assert_eq!(unit(1, 400).token_estimate, 100);
    }

    #[test]
    fn estimate_spans_all_messages() {
        let make = |len: usize| ValidatedMessage {
            message_content: "y".repeat(len),
            direction: MessageDirection::ToClient,
            social_create_time: DateTime::parse_from_rfc3339("2025-08-26T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            agent_info: None,
        };
        // 3 + 3 chars concatenated -> ceil(6/4) = 2
        assert_eq!(estimate_tokens(&[make(3), make(3)]), 2);
    }

    #[test]
    fn empty_input_produces_zero_batches() {
        assert!(pack_into_batches(vec![], 16_000, 20).is_empty());
    }

    #[test]
    fn respects_token_budget() {
        // 100-token units with a 250-token budget: 2 per batch
        let units: Vec<WorkUnit> = (0..5).map(|i| unit(i, 400)).collect();
        let batches = pack_into_batches(units, 250, 20);
        assert_eq!(batches.len(), 3);
        for batch in &batches {
            let total: u64 = batch.iter().map(|u| u.token_estimate).sum();
            assert!(total <= 250);
        }
    }

    #[test]
    fn respects_unit_cap() {
        // Tiny units, generous tokens: count cap decides
        let units: Vec<WorkUnit> = (0..7).map(|i| unit(i, 4)).collect();
        let batches = pack_into_batches(units, 16_000, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[1].len(), 3);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn oversized_unit_is_isolated() {
        let units = vec![unit(1, 40), unit(2, 4_000_000), unit(3, 40)];
        let batches = pack_into_batches(units, 100, 20);
        // Oversized unit sits alone; the small ones share a batch
        assert_eq!(batches.len(), 2);
        let singleton = batches
            .iter()
            .find(|b| b.len() == 1 && b[0].daily_analysis_id == 2)
            .expect("oversized unit should be alone");
        assert_eq!(singleton[0].token_estimate, 1_000_000);
    }

    #[test]
    fn first_fit_backfills_earlier_batches() {
        // 60, 90, 30: 90 opens a second batch, 30 fits back into the first
        let units = vec![unit(1, 240), unit(2, 360), unit(3, 120)];
        let batches = pack_into_batches(units, 100, 20);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][1].daily_analysis_id, 3);
    }
}
