use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{Span, debug};

use super::{EventPublisher, PublishError, QueuedEvent, TelemetryEvent};

/// Producer side of the bounded telemetry queue.
#[derive(Clone)]
pub struct QueuePublisher {
    sender: mpsc::Sender<QueuedEvent>,
}

/// Creates the telemetry queue. A capacity of 0 is raised to 1.
#[must_use]
pub fn channel(capacity: usize) -> (QueuePublisher, mpsc::Receiver<QueuedEvent>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (QueuePublisher { sender }, receiver)
}

impl EventPublisher for QueuePublisher {
    fn publish(&self, event: TelemetryEvent) -> Result<(), PublishError> {
        let kind = event.kind();
        let queued = QueuedEvent {
            event,
            parent: Span::current(),
        };

        self.sender.try_send(queued).map_err(|e| match e {
            TrySendError::Full(_) => PublishError::QueueFull,
            TrySendError::Closed(_) => PublishError::QueueClosed,
        })?;

        debug!(kind, "Telemetry event queued");
        Ok(())
    }
}
