mod admin;
mod analytics;
mod health;
mod recognize;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use admin::admin_data;
pub use analytics::report_engagement;
pub use health::{health, ready};
pub use recognize::recognize;

pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/recognize", post(recognize).layer(body_limit))
        .route("/api/analytics", post(report_engagement))
        .route("/api/admin/data", get(admin_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{body::Body, http::Response};
    use serde_json::Value;
    use starscore_core::GeoResolver;

    use crate::AppState;
    use crate::publisher::MockEventPublisher;
    use crate::repository::MockEventStore;
    use crate::vision::{MockRecognitionClient, RecognitionClient};

    pub fn state(
        store: MockEventStore,
        publisher: MockEventPublisher,
        vision: Option<MockRecognitionClient>,
    ) -> AppState {
        AppState {
            store: Arc::new(store),
            event_publisher: Arc::new(publisher),
            vision: vision.map(|client| Arc::new(client) as Arc<dyn RecognitionClient>),
            geo: Arc::new(GeoResolver::default()),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
