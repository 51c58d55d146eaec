// ABOUTME: Pillar score normalization and the weighted Customer Satisfaction Index
// ABOUTME: Effectiveness, Effort, Efficiency, and Empathy pillars with renormalized weights
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Pillar / CSI Calculator
//!
//! All inputs are first normalized to a 0-10 "goodness" scale:
//!
//! - **Effectiveness** = mean(`resolution_achieved`, `fcr_score`)
//! - **Effort** = `((7 - ces) / 6) * 10`, clipped to [0, 10]
//! - **Efficiency** = mean of the available normalized time scores; each
//!   raw time maps linearly from 10 (at or under the best threshold) to 0
//!   (at or over the worst). Null inputs are omitted; all-null makes the
//!   pillar null.
//! - **Empathy** = `0.4 * sentiment + 0.6 * (sentiment_shift + 5)`,
//!   clipped to [0, 10]
//!
//! **CSI** (0-100) = `10 * (0.40*Effectiveness + 0.25*Effort +
//! 0.15*Efficiency + 0.20*Empathy)`. Null pillars are omitted and the
//! remaining weights renormalized to sum to 1; all-null makes CSI null.
//!
//! Given identical micro-metrics the outputs are byte-identical; there is
//! no randomness or time dependence anywhere in this module.

use serde::{Deserialize, Serialize};

use crate::analysis::time_metrics::TimeMetrics;
use crate::models::DailyScores;

/// Pillar weights in the CSI composite
pub const WEIGHT_EFFECTIVENESS: f64 = 0.40;
/// Effort pillar weight
pub const WEIGHT_EFFORT: f64 = 0.25;
/// Efficiency pillar weight
pub const WEIGHT_EFFICIENCY: f64 = 0.15;
/// Empathy pillar weight
pub const WEIGHT_EMPATHY: f64 = 0.20;

/// Linear normalization thresholds for the three time metrics.
///
/// A raw time at or below `best` scores 10; at or above `worst` scores 0;
/// in between the score falls linearly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeThresholds {
    /// `first_response_time` full-score bound (seconds)
    pub first_response_best_secs: f64,
    /// `first_response_time` zero-score bound (seconds)
    pub first_response_worst_secs: f64,
    /// `avg_response_time` full-score bound (seconds)
    pub avg_response_best_secs: f64,
    /// `avg_response_time` zero-score bound (seconds)
    pub avg_response_worst_secs: f64,
    /// `total_handling_time` full-score bound (minutes)
    pub handling_best_mins: f64,
    /// `total_handling_time` zero-score bound (minutes)
    pub handling_worst_mins: f64,
}

impl Default for TimeThresholds {
    fn default() -> Self {
        Self {
            first_response_best_secs: 60.0,
            first_response_worst_secs: 1_800.0,
            avg_response_best_secs: 120.0,
            avg_response_worst_secs: 3_600.0,
            handling_best_mins: 5.0,
            handling_worst_mins: 60.0,
        }
    }
}

/// The four pillar scores, each 0-10 or null
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PillarScores {
    /// Resolution quality: mean of `resolution_achieved` and `fcr_score`
    pub effectiveness: Option<f64>,
    /// Inverted Customer Effort Score
    pub effort: Option<f64>,
    /// Normalized time metrics
    pub efficiency: Option<f64>,
    /// Sentiment level and trajectory
    pub empathy: Option<f64>,
}

/// Derive the four pillars from micro-metrics and time metrics
#[must_use]
pub fn compute_pillars(
    scores: &DailyScores,
    time: &TimeMetrics,
    thresholds: &TimeThresholds,
) -> PillarScores {
    let effectiveness = (scores.resolution_achieved + scores.fcr_score) / 2.0;
    let effort = clip10((7.0 - scores.ces) / 6.0 * 10.0);
    let empathy = clip10(0.4 * scores.sentiment_score + 0.6 * (scores.sentiment_shift + 5.0));

    let time_scores: Vec<f64> = [
        time.first_response_time.map(|t| {
            normalize_time(t, thresholds.first_response_best_secs, thresholds.first_response_worst_secs)
        }),
        time.avg_response_time.map(|t| {
            normalize_time(t, thresholds.avg_response_best_secs, thresholds.avg_response_worst_secs)
        }),
        time.total_handling_time
            .map(|t| normalize_time(t, thresholds.handling_best_mins, thresholds.handling_worst_mins)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let efficiency = if time_scores.is_empty() {
        None
    } else {
        Some(time_scores.iter().sum::<f64>() / time_scores.len() as f64)
    };

    PillarScores {
        effectiveness: Some(effectiveness),
        effort: Some(effort),
        efficiency,
        empathy: Some(empathy),
    }
}

/// Combine pillars into the 0-100 CSI.
///
/// Null pillars drop out and the remaining weights are renormalized; with
/// all pillars null the CSI is null.
#[must_use]
pub fn compute_csi(pillars: &PillarScores) -> Option<f64> {
    let weighted = [
        (pillars.effectiveness, WEIGHT_EFFECTIVENESS),
        (pillars.effort, WEIGHT_EFFORT),
        (pillars.efficiency, WEIGHT_EFFICIENCY),
        (pillars.empathy, WEIGHT_EMPATHY),
    ];

    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (score, weight) in weighted {
        if let Some(score) = score {
            total += score * weight;
            weight_sum += weight;
        }
    }

    if weight_sum == 0.0 {
        None
    } else {
        Some(10.0 * total / weight_sum)
    }
}

/// Map a raw time onto 0-10: full score at or under `best`, zero at or
/// over `worst`, linear in between
fn normalize_time(raw: f64, best: f64, worst: f64) -> f64 {
    if raw <= best {
        10.0
    } else if raw >= worst {
        0.0
    } else {
        10.0 * (worst - raw) / (worst - best)
    }
}

/// Clip to the 0-10 pillar scale
fn clip10(value: f64) -> f64 {
    value.clamp(0.0, 10.0)
}
