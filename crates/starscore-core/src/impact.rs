//! Qualitative severity of a single API call outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::{FailureKind, ResponseStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Impact on the person who made the call. `processing_time` is in seconds.
#[must_use]
pub fn user_impact(status: ResponseStatus, processing_time: f64) -> Impact {
    match status {
        ResponseStatus::Error => Impact::High,
        ResponseStatus::Success if processing_time > 10.0 => Impact::Medium,
        ResponseStatus::Success => Impact::Low,
    }
}

/// Impact on the service. Successful calls are always low.
#[must_use]
pub fn business_impact(status: ResponseStatus, error_kind: Option<FailureKind>) -> Impact {
    if status == ResponseStatus::Success {
        return Impact::Low;
    }
    match error_kind {
        Some(FailureKind::Timeout | FailureKind::ServerError) => Impact::High,
        Some(FailureKind::InvalidImage | FailureKind::RateLimit) => Impact::Medium,
        _ => Impact::Low,
    }
}

/// `(user_impact, business_impact)` for an outcome.
#[must_use]
pub fn classify(
    status: ResponseStatus,
    processing_time: f64,
    error_kind: Option<FailureKind>,
) -> (Impact, Impact) {
    (
        user_impact(status, processing_time),
        business_impact(status, error_kind),
    )
}
