//! Star-rating recognition through an external vision model.

mod client;

use async_trait::async_trait;
use starscore_core::{AppError, StarTally, events::FailureKind, score::ValidationError};
use thiserror::Error;

pub use client::VisionApiClient;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision API did not answer in time")]
    Timeout,

    #[error("vision API rate limit exceeded")]
    RateLimited,

    #[error("vision API server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("vision API rejected the image ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("vision API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("vision API request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<VisionError> for AppError {
    fn from(err: VisionError) -> Self {
        let message = err.to_string();
        let kind = match err {
            VisionError::Invalid(validation) => return AppError::MalformedPayload(validation),
            VisionError::Timeout => FailureKind::Timeout,
            VisionError::RateLimited => FailureKind::RateLimit,
            VisionError::Server { .. } => FailureKind::ServerError,
            VisionError::Rejected { .. } => FailureKind::InvalidImage,
            VisionError::Status { .. } | VisionError::Transport(_) => FailureKind::UpstreamFailed,
        };
        AppError::Upstream { kind, message }
    }
}

/// Reads a star-rating tally off a screenshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecognitionClient: Send + Sync {
    /// `image_data` is a `data:` URL or an image URL the model can fetch.
    async fn recognize(&self, image_data: &str) -> Result<StarTally, VisionError>;
}
