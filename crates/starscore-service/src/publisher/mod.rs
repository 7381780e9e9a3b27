mod queue_publisher;

use starscore_core::events::{CallOutcome, Engagement, VisitContext};
use thiserror::Error;
use tracing::Span;
use uuid::Uuid;

use crate::client::ClientInfo;

pub use queue_publisher::channel;

/// Telemetry produced by a request and persisted off the request path.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// Outcome of one recognition call.
    Recognition {
        client: ClientInfo,
        request_id: Uuid,
        call: CallOutcome,
    },
    /// Engagement metrics reported by the page.
    Engagement {
        client: ClientInfo,
        session_id: String,
        context: VisitContext,
        engagement: Engagement,
    },
}

impl TelemetryEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Recognition { .. } => "recognition",
            Self::Engagement { .. } => "engagement",
        }
    }
}

/// A telemetry event together with the span of the request that produced it.
#[derive(Debug)]
pub struct QueuedEvent {
    pub event: TelemetryEvent,
    pub parent: Span,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("telemetry queue is full")]
    QueueFull,

    #[error("telemetry queue is closed")]
    QueueClosed,
}

/// Trait for publishing events.
///
/// `publish` must return without waiting for the event to be persisted.
#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: TelemetryEvent) -> Result<(), PublishError>;
}
