use std::time::Instant;

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use starscore_core::{
    AppError, ScoreResult, StarTally,
    events::{CallOutcome, FailureDetail, ImageInfo, Outcome, RecognitionPayload, Timing},
    score::{self, ImageQuality},
};
use tracing::{Span, info, instrument, warn};
use uuid::Uuid;

use crate::AppState;
use crate::client::ClientInfo;
use crate::publisher::TelemetryEvent;

const ENDPOINT: &str = "/api/recognize";

#[derive(Debug, Default, Deserialize)]
pub struct RecognizeRequest {
    #[serde(rename = "imageData", alias = "image_data", default)]
    pub image_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub data: StarTally,
    pub scores: ScoreResult,
    pub confidence: f64,
    pub image_quality: ImageQuality,
}

impl RecognizeResponse {
    fn payload(&self) -> RecognitionPayload {
        RecognitionPayload {
            recognition_result: self.data,
            calculated_scores: self.scores.clone(),
            confidence_score: self.confidence,
            image_quality: self.image_quality,
        }
    }
}

/// Recognizes a star-rating screenshot and scores it.
///
/// The outcome, successful or not, is queued as telemetry before the reply
/// is returned. Persisting it never delays or fails the reply.
#[instrument(skip_all, fields(request_id, address = %client.address))]
pub async fn recognize(
    State(state): State<AppState>,
    client: ClientInfo,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<RecognizeResponse>, AppError> {
    let request_id = Uuid::new_v4();
    Span::current().record("request_id", tracing::field::display(request_id));
    let start_time = Utc::now();

    let request_size = match &body {
        Ok(bytes) => bytes.len() as u64,
        Err(_) => content_length(&headers).unwrap_or(0),
    };
    let request = body.map_err(body_error).and_then(|bytes| parse_request(&bytes));
    let image_info = request
        .as_ref()
        .ok()
        .and_then(|r| r.image_data.as_deref())
        .filter(|data| !data.trim().is_empty())
        .map(ImageInfo::from_image_data);

    let mut api_time = None;
    let result = run(&state, request, request_id, &mut api_time).await;
    let timing = Timing::new(start_time, Utc::now(), api_time);

    let (status_code, outcome) = match &result {
        Ok(response) => {
            info!(
                total = response.scores.total,
                current = response.scores.current,
                "Recognition succeeded"
            );
            (200, Outcome::Success(response.payload()))
        }
        Err(e) => {
            warn!(code = e.code(), error = %e, "Recognition failed");
            (
                e.status_code().as_u16(),
                Outcome::Error(FailureDetail {
                    error_type: e.failure_kind(),
                    error_message: e.to_string(),
                    error_code: Some(e.code().to_string()),
                }),
            )
        }
    };

    let event = TelemetryEvent::Recognition {
        client,
        request_id,
        call: CallOutcome {
            endpoint: ENDPOINT.to_string(),
            method: "POST".to_string(),
            request_size,
            image_info,
            timing,
            status_code,
            outcome,
            retry_count: 0,
        },
    };
    if let Err(e) = state.event_publisher.publish(event) {
        warn!(error = %e, "Dropped recognition telemetry");
    }

    result.map(Json)
}

fn body_error(rejection: BytesRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(rejection.body_text())
    } else {
        AppError::BadRequest(rejection.body_text())
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn parse_request(body: &[u8]) -> Result<RecognizeRequest, AppError> {
    if body.is_empty() {
        return Ok(RecognizeRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("request body is not valid JSON: {e}")))
}

async fn run(
    state: &AppState,
    request: Result<RecognizeRequest, AppError>,
    request_id: Uuid,
    api_time: &mut Option<f64>,
) -> Result<RecognizeResponse, AppError> {
    let image_data = request?
        .image_data
        .filter(|data| !data.trim().is_empty())
        .ok_or(AppError::MissingImage)?;

    let vision = state
        .vision
        .as_ref()
        .ok_or_else(|| AppError::Configuration("vision API key is not set".to_string()))?;

    let started = Instant::now();
    let recognized = vision.recognize(&image_data).await;
    *api_time = Some(started.elapsed().as_secs_f64());
    let tally = recognized?;

    Ok(RecognizeResponse {
        success: true,
        request_id,
        data: tally,
        scores: score::score(&tally),
        confidence: score::confidence(tally.total()),
        image_quality: ImageInfo::from_image_data(&image_data).quality,
    })
}
