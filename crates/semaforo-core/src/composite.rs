//! Composite scores for dashboard widgets.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Range every sub-indicator and the composite live in.
pub const SCORE_RANGE: RangeInclusive<f64> = 0.0..=100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Indicator {
    /// Display name, e.g. "ahorro" or "endeudamiento"
    pub name: String,
    /// Sub-indicator value on the 0–100 scale
    pub value: f64,
    /// Relative weight; normalized against the other usable indicators
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub name: String,
    /// Normalized weight; all contributions sum to 1.
    pub weight: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composite {
    pub score: f64,
    pub contributions: Vec<Contribution>,
}

fn usable(indicator: &Indicator) -> bool {
    indicator.value.is_finite() && indicator.weight.is_finite() && indicator.weight > 0.0
}

/// Weighted mean of the usable indicators. `None` when nothing is usable,
/// which the classifier treats as the worst level.
pub fn composite(indicators: &[Indicator]) -> Option<Composite> {
    let kept: Vec<&Indicator> = indicators.iter().filter(|i| usable(i)).collect();
    if kept.len() < indicators.len() {
        tracing::debug!(
            skipped = indicators.len() - kept.len(),
            "ignoring indicators with unusable value or weight"
        );
    }
    // Scale by the largest weight first so the sum stays finite.
    let max = kept.iter().map(|i| i.weight).fold(0.0, f64::max);
    if kept.is_empty() || max <= 0.0 {
        return None;
    }
    let total: f64 = kept.iter().map(|i| i.weight / max).sum();

    let (lo, hi) = (*SCORE_RANGE.start(), *SCORE_RANGE.end());
    let contributions: Vec<Contribution> = kept
        .iter()
        .map(|i| Contribution {
            name: i.name.clone(),
            weight: i.weight / max / total,
            value: i.value.clamp(lo, hi),
        })
        .collect();
    let score = contributions
        .iter()
        .map(|c| c.weight * c.value)
        .sum::<f64>()
        .clamp(lo, hi);

    Some(Composite {
        score,
        contributions,
    })
}

pub fn composite_score(indicators: &[Indicator]) -> Option<f64> {
    composite(indicators).map(|c| c.score)
}
