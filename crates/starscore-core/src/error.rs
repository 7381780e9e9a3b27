use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::events::FailureKind;
use crate::score::ValidationError;

/// Errors surfaced to the caller of a business endpoint.
///
/// Telemetry failures never become an `AppError`; they are absorbed by the
/// recorders.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Missing image data")]
    MissingImage,

    #[error("Malformed recognition payload: {0}")]
    MalformedPayload(#[from] ValidationError),

    #[error("Upstream request failed ({kind}): {message}")]
    Upstream { kind: FailureKind, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl AppError {
    /// Stable machine-readable code returned in the error body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::MissingImage => "MISSING_IMAGE",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::Upstream { kind, .. } => match kind {
                FailureKind::Timeout => "UPSTREAM_TIMEOUT",
                FailureKind::RateLimit => "RATE_LIMITED",
                _ => "UPSTREAM_FAILED",
            },
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Failure classification stored on the response event for this error.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::MissingImage => FailureKind::MissingImage,
            Self::MalformedPayload(_) => FailureKind::MalformedPayload,
            Self::Upstream { kind, .. } => *kind,
            Self::Configuration(_) => FailureKind::Configuration,
            Self::NotFound(_) | Self::BadRequest(_) | Self::PayloadTooLarge(_) => {
                FailureKind::InvalidRequest
            }
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) => {
                FailureKind::Internal
            }
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::MissingImage => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MalformedPayload(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream { kind, .. } => match kind {
                FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                FailureKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
                FailureKind::InvalidImage => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Configuration(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Database error occurred".to_string()
            }
            Self::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                "Serialization error".to_string()
            }
            Self::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            Self::Configuration(e) => {
                tracing::error!("Configuration error: {}", e);
                "Service is not configured for recognition".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.public_message(),
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
