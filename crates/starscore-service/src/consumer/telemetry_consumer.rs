use std::sync::Arc;

use async_trait::async_trait;
use starscore_core::{events::VisitContext, session, time::beijing_day};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tracing::{Instrument, debug, info, info_span};

use super::EventConsumer;
use crate::publisher::{QueuedEvent, TelemetryEvent};
use crate::recorder::{AccessEventRecorder, ResponseEventRecorder};

/// Persists one telemetry event through the recorders.
pub struct TelemetryHandler {
    access: AccessEventRecorder,
    responses: ResponseEventRecorder,
}

impl TelemetryHandler {
    #[must_use]
    pub fn new(access: AccessEventRecorder, responses: ResponseEventRecorder) -> Self {
        Self { access, responses }
    }

    pub async fn handle(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Recognition {
                client,
                request_id,
                call,
            } => {
                // Fingerprint on the day the request started, not the day it is persisted.
                let day = beijing_day(call.timing.start_time);
                let session_id = session::fingerprint(&client.address, &client.user_agent, day);
                let context = VisitContext {
                    referrer: client.referrer.clone(),
                    ..Default::default()
                };

                let access = self
                    .access
                    .find_or_create(&client.address, &client.user_agent, &session_id, context)
                    .await;
                self.responses
                    .record(request_id, access.map(|event| event.id), call)
                    .await;
            }
            TelemetryEvent::Engagement {
                client,
                session_id,
                mut context,
                engagement,
            } => {
                if context.referrer.is_none() {
                    context.referrer = client.referrer.clone();
                }

                let Some(access) = self
                    .access
                    .find_or_create(&client.address, &client.user_agent, &session_id, context)
                    .await
                else {
                    debug!(%session_id, "No access event to attach engagement to");
                    return;
                };
                self.access.amend(access.id, &engagement).await;
            }
        }
    }
}

/// Drains the telemetry queue, handling each event in its own task.
pub struct TelemetryConsumer {
    receiver: Mutex<mpsc::Receiver<QueuedEvent>>,
    handler: Arc<TelemetryHandler>,
    permits: Arc<Semaphore>,
    concurrency: u32,
}

impl TelemetryConsumer {
    /// At most `concurrency` events are handled at once; 0 is raised to 1.
    #[must_use]
    pub fn new(
        receiver: mpsc::Receiver<QueuedEvent>,
        handler: TelemetryHandler,
        concurrency: usize,
    ) -> Self {
        let concurrency = u32::try_from(concurrency.max(1)).unwrap_or(u32::MAX);
        Self {
            receiver: Mutex::new(receiver),
            handler: Arc::new(handler),
            permits: Arc::new(Semaphore::new(concurrency as usize)),
            concurrency,
        }
    }
}

#[async_trait]
impl EventConsumer for TelemetryConsumer {
    async fn start_consuming(&self) -> anyhow::Result<()> {
        let mut receiver = self.receiver.lock().await;
        info!(concurrency = self.concurrency, "Started consuming telemetry events");

        while let Some(queued) = receiver.recv().await {
            let permit = Arc::clone(&self.permits).acquire_owned().await?;
            let handler = Arc::clone(&self.handler);

            // Child of the request span, which may already have closed.
            let span = info_span!(
                parent: &queued.parent,
                "process_telemetry_event",
                kind = queued.event.kind(),
            );

            tokio::spawn(
                async move {
                    handler.handle(queued.event).await;
                    drop(permit);
                }
                .instrument(span),
            );
        }

        // Queue closed: wait for in-flight events before returning.
        let _drained = self.permits.acquire_many(self.concurrency).await?;
        info!("Telemetry queue closed");
        Ok(())
    }
}
