use axum::{Json, body::Bytes, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use starscore_core::{
    AppError,
    events::{Engagement, ExitType, UserAction, VisitContext},
};
use tracing::{instrument, warn};

use crate::AppState;
use crate::client::ClientInfo;
use crate::publisher::TelemetryEvent;

/// Engagement metrics posted by the page as the visitor leaves.
#[derive(Debug, Deserialize)]
pub struct EngagementReport {
    pub session_id: Option<String>,
    pub time_on_page: Option<f64>,
    pub page_load_time: Option<f64>,
    #[serde(default)]
    pub actions: Vec<UserAction>,
    /// Unknown values are ignored.
    pub exit_type: Option<String>,
    pub referrer: Option<String>,
    pub screen_resolution: Option<String>,
    pub viewport_size: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
}

impl EngagementReport {
    fn split(self) -> (VisitContext, Engagement) {
        let context = VisitContext {
            referrer: self.referrer,
            page_load_time: self.page_load_time,
            actions: Vec::new(),
            screen_resolution: self.screen_resolution,
            viewport_size: self.viewport_size,
            language: self.language,
            timezone: self.timezone,
        };
        let engagement = Engagement {
            time_on_page: self.time_on_page,
            actions: self.actions,
            exit_type: self.exit_type.as_deref().and_then(ExitType::parse),
            page_load_time: self.page_load_time,
        };
        (context, engagement)
    }
}

/// Accepts an engagement report whatever its content type: pages send it
/// with `navigator.sendBeacon`, which posts `text/plain`.
#[instrument(skip(state, client, body))]
pub async fn report_engagement(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let mut report: EngagementReport = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("request body is not valid JSON: {e}")))?;

    let session_id = report
        .session_id
        .take()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("session_id is required".to_string()))?;
    let (context, engagement) = report.split();

    let event = TelemetryEvent::Engagement {
        client,
        session_id,
        context,
        engagement,
    };
    if let Err(e) = state.event_publisher.publish(event) {
        warn!(error = %e, "Dropped engagement telemetry");
    }

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    use crate::publisher::MockEventPublisher;
    use crate::repository::MockEventStore;
    use crate::routes::{router, test_support};

    use super::*;

    fn post(body: &'static str) -> Request<Body> {
        Request::post("/api/analytics")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn queues_engagement_and_returns_immediately() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|event| match event {
                TelemetryEvent::Engagement {
                    session_id,
                    context,
                    engagement,
                    ..
                } => {
                    session_id == "s-1"
                        && context.language.as_deref() == Some("zh-CN")
                        && engagement.exit_type == Some(ExitType::Bounce)
                        && engagement.actions.len() == 1
                }
                TelemetryEvent::Recognition { .. } => false,
            })
            .times(1)
            .returning(|_| Ok(()));

        let app = router(test_support::state(MockEventStore::new(), publisher, None));
        let response = app
            .oneshot(post(
                r#"{
                    "session_id": "s-1",
                    "time_on_page": 4.2,
                    "exit_type": "bounce",
                    "language": "zh-CN",
                    "actions": [{"action": "upload", "timestamp": "2024-05-01T10:00:00Z"}]
                }"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::json_body(response).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn accepts_beacon_posted_as_plain_text() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|event| match event {
                TelemetryEvent::Engagement {
                    session_id,
                    engagement,
                    ..
                } => session_id == "session_1_abc" && engagement.time_on_page == Some(12.0),
                TelemetryEvent::Recognition { .. } => false,
            })
            .times(1)
            .returning(|_| Ok(()));

        let app = router(test_support::state(MockEventStore::new(), publisher, None));
        let response = app
            .oneshot(
                Request::post("/api/analytics")
                    .header(header::CONTENT_TYPE, "text/plain;charset=UTF-8")
                    .body(Body::from(
                        r#"{"session_id":"session_1_abc","time_on_page":12,"exit_type":"navigation"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().never();

        let app = router(test_support::state(MockEventStore::new(), publisher, None));
        let response = app.oneshot(post("{session_id")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_session_id_is_rejected() {
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().never();

        let app = router(test_support::state(MockEventStore::new(), publisher, None));
        let response = app
            .oneshot(post(r#"{"time_on_page": 1.0}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = test_support::json_body(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[test]
    fn unknown_exit_type_is_dropped() {
        let report: EngagementReport =
            serde_json::from_str(r#"{"session_id": "s", "exit_type": "teleported"}"#).unwrap();
        let (_, engagement) = report.split();
        assert_eq!(engagement.exit_type, None);
    }
}
