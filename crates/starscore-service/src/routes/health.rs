use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service_name: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

/// Liveness probe.
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service_name: env!("CARGO_PKG_NAME"),
    })
}

/// Readiness probe. Not ready while the event store is unreachable.
#[instrument(skip(state))]
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                database: Some("ok"),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Event store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "not ready",
                    database: Some("unavailable"),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use crate::publisher::MockEventPublisher;
    use crate::repository::{MockEventStore, PersistenceError};
    use crate::routes::{router, test_support};

    #[tokio::test]
    async fn health_reports_service_name() {
        let app = router(test_support::state(
            MockEventStore::new(),
            MockEventPublisher::new(),
            None,
        ));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = test_support::json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service_name"], "starscore-service");
    }

    #[tokio::test]
    async fn ready_is_503_without_database() {
        let mut store = MockEventStore::new();
        store
            .expect_ping()
            .returning(|| Err(PersistenceError::Database(sqlx::Error::PoolClosed)));

        let app = router(test_support::state(store, MockEventPublisher::new(), None));
        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 503);
        let body = test_support::json_body(response).await;
        assert_eq!(body["database"], "unavailable");
    }

    #[tokio::test]
    async fn ready_when_database_answers() {
        let mut store = MockEventStore::new();
        store.expect_ping().returning(|| Ok(()));

        let app = router(test_support::state(store, MockEventPublisher::new(), None));
        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
