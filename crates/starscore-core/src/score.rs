//! Weighted star rating and "reviews needed" projections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Target averages, keyed by the label shown to users. A displayed "4.7"
/// is reached once the true average rounds to it, i.e. at 4.65.
pub const THRESHOLDS: [(&str, f64); 3] = [("4.7", 4.65), ("4.8", 4.75), ("4.9", 4.85)];

/// Largest per-rating count accepted from a recognition reply. Keeps every
/// sum and projection well inside `u64` and exactly representable as `f64`.
pub const MAX_REVIEW_COUNT: u64 = 1_000_000_000;

const KB: u64 = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("recognition result is not valid JSON: {0}")]
    NotJson(String),

    #[error("recognition result is not a JSON object")]
    NotAnObject,

    #[error("recognition reply contained no content")]
    EmptyReply,

    #[error("recognition result is missing the {0}-star count")]
    MissingRating(u8),

    #[error("invalid count for {rating}-star ratings: {value}")]
    InvalidCount { rating: u8, value: String },
}

/// Review counts per star rating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarTally {
    #[serde(rename = "5星", alias = "5")]
    pub five: u64,
    #[serde(rename = "4星", alias = "4")]
    pub four: u64,
    #[serde(rename = "3星", alias = "3")]
    pub three: u64,
    #[serde(rename = "2星", alias = "2")]
    pub two: u64,
    #[serde(rename = "1星", alias = "1")]
    pub one: u64,
}

impl StarTally {
    #[must_use]
    pub fn from_counts(five: u64, four: u64, three: u64, two: u64, one: u64) -> Self {
        Self {
            five,
            four,
            three,
            two,
            one,
        }
    }

    /// Parses the text reply of the vision model.
    ///
    /// Markdown code fences are stripped first. Every rating from 1 to 5 must
    /// be present, keyed either `"N星"` or `"N"`, with a non-negative integer
    /// count of at most [`MAX_REVIEW_COUNT`].
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` when the text is not a JSON object or a
    /// rating is missing or not a count.
    pub fn from_recognition_text(content: &str) -> Result<Self, ValidationError> {
        let cleaned = content.replace("```json", "").replace("```", "");
        let value: Value = serde_json::from_str(cleaned.trim())
            .map_err(|e| ValidationError::NotJson(e.to_string()))?;
        Self::from_recognition(&value)
    }

    /// # Errors
    ///
    /// See [`StarTally::from_recognition_text`].
    pub fn from_recognition(value: &Value) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let count = |rating: u8| -> Result<u64, ValidationError> {
            let raw = object
                .get(&format!("{rating}星"))
                .or_else(|| object.get(&rating.to_string()))
                .ok_or(ValidationError::MissingRating(rating))?;
            raw.as_u64()
                .filter(|count| *count <= MAX_REVIEW_COUNT)
                .ok_or_else(|| ValidationError::InvalidCount {
                    rating,
                    value: raw.to_string(),
                })
        };

        Ok(Self::from_counts(count(5)?, count(4)?, count(3)?, count(2)?, count(1)?))
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.five + self.four + self.three + self.two + self.one
    }

    /// Σ rating × count.
    #[must_use]
    pub fn weighted_sum(&self) -> u64 {
        5 * self.five + 4 * self.four + 3 * self.three + 2 * self.two + self.one
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Weighted average rounded to two decimals; 0 when there are no reviews.
    pub current: f64,
    pub total: u64,
    /// Additional 5-star reviews needed per threshold label.
    pub projections: BTreeMap<String, u64>,
}

/// Scores a tally and solves the projection for every [`THRESHOLDS`] entry.
#[must_use]
pub fn score(tally: &StarTally) -> ScoreResult {
    let total = tally.total();
    if total == 0 {
        return ScoreResult {
            current: 0.0,
            total: 0,
            projections: THRESHOLDS
                .iter()
                .map(|(label, _)| ((*label).to_string(), 0))
                .collect(),
        };
    }

    // Projections work from the exact weighted sum (current × total before
    // any rounding); only the reported average is rounded.
    let weighted_sum = tally.weighted_sum();
    let current = weighted_sum as f64 / total as f64;

    ScoreResult {
        current: round2(current),
        total,
        projections: THRESHOLDS
            .iter()
            .map(|(label, target)| {
                (
                    (*label).to_string(),
                    additional_five_stars(weighted_sum, total, *target),
                )
            })
            .collect(),
    }
}

/// Minimum `n >= 0` with `(sum + 5n) / (total + n) >= target`.
///
/// Closed form: `n = ceil((sum - target * total) / (target - 5))`. The
/// divisor is negative for every target below 5, which is what turns the
/// inequality into a lower bound on `n`. A target of 5 or more is treated as
/// needing nothing. The result is nudged by at most a step in either
/// direction so float error at an exact boundary never breaks minimality.
#[must_use]
pub fn additional_five_stars(weighted_sum: u64, total: u64, target: f64) -> u64 {
    if total == 0 || target >= 5.0 {
        return 0;
    }

    let sum = weighted_sum as f64;
    let count = total as f64;
    let solved = ((sum - target * count) / (target - 5.0)).ceil();
    let mut needed = if solved > 0.0 { solved as u64 } else { 0 };

    while needed > 0 && reaches(weighted_sum, total, needed - 1, target) {
        needed -= 1;
    }
    while !reaches(weighted_sum, total, needed, target) {
        needed += 1;
    }
    needed
}

fn reaches(weighted_sum: u64, total: u64, extra_five_stars: u64, target: f64) -> bool {
    let sum = (weighted_sum + 5 * extra_five_stars) as f64;
    let count = (total + extra_five_stars) as f64;
    sum / count >= target
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Coarse confidence in a recognition result, from the number of reviews read.
#[must_use]
pub fn confidence(total: u64) -> f64 {
    match total {
        0 => 0.0,
        1..=9 => 0.6,
        10..=49 => 0.8,
        _ => 0.95,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Poor,
    Fair,
    Good,
}

impl ImageQuality {
    #[must_use]
    pub fn from_byte_size(bytes: u64) -> Self {
        if bytes < 100 * KB {
            Self::Poor
        } else if bytes < 500 * KB {
            Self::Fair
        } else {
            Self::Good
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
        }
    }
}
