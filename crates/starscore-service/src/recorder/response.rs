use std::sync::Arc;

use starscore_core::{
    events::{CallOutcome, ResponseEvent, ResponseRecord},
    impact,
    time::beijing_now,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::repository::EventStore;

pub struct ResponseEventRecorder {
    store: Arc<dyn EventStore>,
}

impl ResponseEventRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Classifies and stores one call outcome. `access_event_id` is `None`
    /// when the visit itself could not be recorded.
    #[instrument(skip(self, call), fields(endpoint = %call.endpoint, status = call.outcome.status().as_str()))]
    pub async fn record(
        &self,
        request_id: Uuid,
        access_event_id: Option<Uuid>,
        call: CallOutcome,
    ) -> Option<ResponseEvent> {
        let (user_impact, business_impact) = impact::classify(
            call.outcome.status(),
            call.timing.processing_time,
            call.outcome.failure_kind(),
        );

        let record = ResponseRecord {
            request_id,
            access_event_id,
            call,
            user_impact,
            business_impact,
            beijing_time: beijing_now(),
        };

        match self.store.insert_response(&record).await {
            Ok(id) => {
                info!(
                    response_event_id = %id,
                    %user_impact,
                    %business_impact,
                    "Response event recorded"
                );
                Some(ResponseEvent { id, record })
            }
            Err(e) => {
                error!(error = %e, "Failed to store response event");
                None
            }
        }
    }
}
