use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impact::Impact;
use crate::score::{ImageQuality, ScoreResult, StarTally};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

impl ResponseStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Why a business call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingImage,
    InvalidImage,
    InvalidRequest,
    MalformedPayload,
    Timeout,
    ServerError,
    RateLimit,
    UpstreamFailed,
    Configuration,
    Internal,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingImage => "missing_image",
            Self::InvalidImage => "invalid_image",
            Self::InvalidRequest => "invalid_request",
            Self::MalformedPayload => "malformed_payload",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::RateLimit => "rate_limit",
            Self::UpstreamFailed => "upstream_failed",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about the submitted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub format: Option<String>,
    pub byte_size: u64,
    pub quality: ImageQuality,
}

impl ImageInfo {
    /// Derives metadata from a `data:` URL or a plain image reference.
    ///
    /// For base64 data URLs the byte size is estimated from the payload
    /// length; for anything else it is the length of the reference itself.
    #[must_use]
    pub fn from_image_data(image_data: &str) -> Self {
        let (format, byte_size) = match image_data
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
        {
            Some((header, payload)) => {
                let format = header
                    .split(';')
                    .next()
                    .and_then(|mime| mime.strip_prefix("image/"))
                    .filter(|subtype| !subtype.is_empty())
                    .map(str::to_string);
                let byte_size = if header.ends_with(";base64") {
                    base64_decoded_len(payload)
                } else {
                    payload.len() as u64
                };
                (format, byte_size)
            }
            None => (None, image_data.len() as u64),
        };

        Self {
            format,
            byte_size,
            quality: ImageQuality::from_byte_size(byte_size),
        }
    }
}

fn base64_decoded_len(payload: &str) -> u64 {
    let payload = payload.trim_end();
    let padding = payload.bytes().rev().take_while(|b| *b == b'=').count() as u64;
    (payload.len() as u64 * 3 / 4).saturating_sub(padding)
}

/// Wall-clock breakdown of one call. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub processing_time: f64,
    /// Time spent waiting on the vision API, when it was called.
    pub api_time: Option<f64>,
    /// `processing_time - api_time`, never negative.
    pub internal_time: f64,
}

impl Timing {
    #[must_use]
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>, api_time: Option<f64>) -> Self {
        let processing_time = (end_time - start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let internal_time = (processing_time - api_time.unwrap_or_default()).max(0.0);

        Self {
            start_time,
            end_time,
            processing_time,
            api_time,
            internal_time,
        }
    }
}

/// Result of a successful recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionPayload {
    pub recognition_result: StarTally,
    pub calculated_scores: ScoreResult,
    pub confidence_score: f64,
    pub image_quality: ImageQuality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub error_type: FailureKind,
    pub error_message: String,
    pub error_code: Option<String>,
}

/// Exactly one of recognition payload or error fields, keyed by status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success(RecognitionPayload),
    Error(FailureDetail),
}

impl Outcome {
    #[must_use]
    pub fn status(&self) -> ResponseStatus {
        match self {
            Self::Success(_) => ResponseStatus::Success,
            Self::Error(_) => ResponseStatus::Error,
        }
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Error(detail) => Some(detail.error_type),
        }
    }
}

/// Everything the request handler knows about a finished call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub endpoint: String,
    pub method: String,
    pub request_size: u64,
    pub image_info: Option<ImageInfo>,
    #[serde(flatten)]
    pub timing: Timing,
    pub status_code: u16,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub retry_count: u32,
}

/// A response event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub request_id: Uuid,
    pub access_event_id: Option<Uuid>,
    #[serde(flatten)]
    pub call: CallOutcome,
    pub user_impact: Impact,
    pub business_impact: Impact,
    pub beijing_time: DateTime<FixedOffset>,
}

/// A persisted API call outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: ResponseRecord,
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;

    #[test]
    fn jpeg_data_url() {
        // 8 base64 chars with one pad -> 5 bytes.
        let info = ImageInfo::from_image_data("data:image/jpeg;base64,AAAAAAA=");
        assert_eq!(info.format.as_deref(), Some("jpeg"));
        assert_eq!(info.byte_size, 5);
        assert_eq!(info.quality, ImageQuality::Poor);
    }

    #[test]
    fn large_png_is_good_quality() {
        let payload = "A".repeat(700 * 1024);
        let info = ImageInfo::from_image_data(&format!("data:image/png;base64,{payload}"));
        assert_eq!(info.format.as_deref(), Some("png"));
        assert_eq!(info.byte_size, 525 * 1024);
        assert_eq!(info.quality, ImageQuality::Good);
    }

    #[test]
    fn plain_url_has_no_format() {
        let info = ImageInfo::from_image_data("https://cdn.example.com/a.jpg");
        assert_eq!(info.format, None);
        assert_eq!(info.quality, ImageQuality::Poor);
    }

    #[test]
    fn internal_time_is_the_residual() {
        let start = Utc::now();
        let end = start + TimeDelta::milliseconds(2500);
        let timing = Timing::new(start, end, Some(2.0));
        assert!((timing.processing_time - 2.5).abs() < 1e-9);
        assert!((timing.internal_time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn internal_time_never_negative() {
        let start = Utc::now();
        let timing = Timing::new(start, start + TimeDelta::seconds(1), Some(3.0));
        assert_eq!(timing.internal_time, 0.0);
    }

    #[test]
    fn error_outcome_serializes_without_recognition_fields() {
        let outcome = Outcome::Error(FailureDetail {
            error_type: FailureKind::Timeout,
            error_message: "deadline exceeded".into(),
            error_code: Some("UPSTREAM_TIMEOUT".into()),
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], json!("error"));
        assert_eq!(value["error_type"], json!("timeout"));
        assert!(value.get("recognition_result").is_none());
        assert!(value.get("calculated_scores").is_none());
    }

    #[test]
    fn success_outcome_serializes_without_error_fields() {
        let tally = StarTally::from_counts(3, 1, 0, 0, 0);
        let outcome = Outcome::Success(RecognitionPayload {
            recognition_result: tally,
            calculated_scores: crate::score::score(&tally),
            confidence_score: 0.6,
            image_quality: ImageQuality::Fair,
        });
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], json!("success"));
        assert!(value.get("error_type").is_none());
        assert!(value.get("error_message").is_none());
        assert_eq!(outcome.failure_kind(), None);
    }
}
