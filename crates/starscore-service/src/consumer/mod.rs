mod telemetry_consumer;

use async_trait::async_trait;

pub use telemetry_consumer::{TelemetryConsumer, TelemetryHandler};

/// Trait for consuming events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Consume events until the queue closes, then wait for in-flight work.
    async fn start_consuming(&self) -> anyhow::Result<()>;
}
