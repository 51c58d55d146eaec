// ABOUTME: Batch prompt construction and strict JSON response parsing for daily scoring
// ABOUTME: Any structural deviation resolves to per-unit fallback records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Batch Prompt & Parsing
//!
//! One prompt embeds, for each unit, the unit's ordinal index and its
//! ordered messages (direction + content + timestamp). The model must
//! return a strict JSON array of per-unit objects with the five AI-derived
//! micro-metrics. Time metrics are never requested from the model; they
//! are computed deterministically after the call.
//!
//! Parsing contract: the response must be a JSON array whose length equals
//! the batch size, and each element must contain numeric values within the
//! documented ranges. On any deviation the affected units (all of them, for
//! non-JSON or wrong length) receive the fallback record
//! `{sentiment_score: 5, sentiment_shift: 0, resolution_achieved: 5,
//! fcr_score: 5, ces: 4, error: "analysis_failed"}`.

use serde_json::{json, Value};
use tracing::warn;

use crate::analysis::batcher::WorkUnit;
use crate::llm::UnitOutcome;
use crate::models::DailyScores;

/// Upper bound on topics kept per unit
const MAX_TOPICS_PER_UNIT: usize = 5;

/// Build the single batch prompt for a job's units
#[must_use]
pub fn build_batch_prompt(units: &[WorkUnit]) -> String {
    let entries: Vec<Value> = units
        .iter()
        .enumerate()
        .map(|(index, unit)| {
            let messages: Vec<Value> = unit
                .messages
                .iter()
                .map(|m| {
                    json!({
                        "direction": m.direction.as_str(),
                        "timestamp": m.social_create_time.to_rfc3339(),
                        "content": m.message_content,
                    })
                })
                .collect();
            json!({
                "index": index,
                "messages": messages,
            })
        })
        .collect();

    let input_block =
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_owned());

    format!(
        r#"Analyze the following batch of customer service conversation-days. Each entry is one calendar day of one conversation; "to_company" messages are from the customer, "to_client" messages are from a support agent.

CONVERSATION_DAYS:
{input_block}

Score every entry independently and respond with a JSON array containing exactly {count} objects, one per entry, in the same order as the input. Use this EXACT format for each object:
{{
    "index": <the entry's index>,
    "sentiment_score": <0-10 number>,
    "sentiment_shift": <-5 to +5 number>,
    "resolution_achieved": <0-10 number>,
    "fcr_score": <0-10 number>,
    "ces": <1-7 number>,
    "topics": ["topic1", "topic2", "topic3"]
}}

SCORING GUIDELINES:
- sentiment_score: overall customer sentiment for the day. 0 = hostile, 5 = neutral, 10 = delighted.
- sentiment_shift: change in customer sentiment from the start of the day to the end. Negative means the customer left angrier than they arrived.
- resolution_achieved: how completely the customer's issue was resolved within the day.
- fcr_score: likelihood the issue was resolved in this single contact without needing follow-up.
- ces: Customer Effort Score. 1 = effortless for the customer, 7 = extremely laborious.
- topics: up to three short topics discussed.
- Be concise and accurate. Output ONLY the JSON array, nothing else."#,
        input_block = input_block,
        count = units.len(),
    )
}

/// Parse a batch response into positional per-unit outcomes.
///
/// Never fails: structural deviations degrade to fallback records so a
/// misbehaving model cannot take down the job pipeline.
#[must_use]
pub fn parse_batch_response(response: &str, expected_len: usize) -> Vec<UnitOutcome> {
    let body = strip_code_fences(response);

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "LLM response is not valid JSON; substituting fallbacks");
            return vec![UnitOutcome::fallback(); expected_len];
        }
    };

    let Some(items) = parsed.as_array() else {
        warn!("LLM response is not a JSON array; substituting fallbacks");
        return vec![UnitOutcome::fallback(); expected_len];
    };

    if items.len() != expected_len {
        warn!(
            got = items.len(),
            expected = expected_len,
            "LLM response length mismatch; substituting fallbacks"
        );
        return vec![UnitOutcome::fallback(); expected_len];
    }

    items.iter().map(parse_unit).collect()
}

/// Parse one element; schema violations fall back for that unit only
fn parse_unit(item: &Value) -> UnitOutcome {
    let Some(scores) = extract_scores(item) else {
        return UnitOutcome::fallback();
    };

    if !scores.in_range() {
        warn!("LLM unit scores out of range; substituting fallback");
        return UnitOutcome::fallback();
    }

    UnitOutcome {
        scores,
        topics: extract_topics(item),
        error: None,
    }
}

fn extract_scores(item: &Value) -> Option<DailyScores> {
    Some(DailyScores {
        sentiment_score: item.get("sentiment_score")?.as_f64()?,
        sentiment_shift: item.get("sentiment_shift")?.as_f64()?,
        resolution_achieved: item.get("resolution_achieved")?.as_f64()?,
        fcr_score: item.get("fcr_score")?.as_f64()?,
        ces: item.get("ces")?.as_f64()?,
    })
}

/// Topics are best-effort: absent or malformed degrades to empty, never an
/// error
fn extract_topics(item: &Value) -> Vec<String> {
    item.get("topics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .take(MAX_TOPICS_PER_UNIT)
                .collect()
        })
        .unwrap_or_default()
}

/// Tolerate a markdown code fence around the JSON body
fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    if let Some(rest) = trimmed.strip_prefix("```json").or_else(|| trimmed.strip_prefix("```")) {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    trimmed
}
