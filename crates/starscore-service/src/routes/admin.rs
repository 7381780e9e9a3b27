use axum::{Json, extract::State};
use serde::Serialize;
use starscore_core::{events::AccessEvent, geo::GeoStats};
use tracing::{instrument, warn};

use crate::AppState;
use crate::repository::{ResponseEventRow, Statistics};

const RECENT_LIMIT: i64 = 1000;

#[derive(Debug, Serialize)]
pub struct AdminData {
    pub success: bool,
    pub statistics: Statistics,
    pub geo: GeoStats,
    pub access_events: Vec<AccessEvent>,
    pub response_events: Vec<ResponseEventRow>,
}

/// Dashboard snapshot. Store failures degrade to zeros and empty lists.
#[instrument(skip(state))]
pub async fn admin_data(State(state): State<AppState>) -> Json<AdminData> {
    let (statistics, access_events, response_events) = tokio::join!(
        state.store.statistics(),
        state.store.recent_access_events(RECENT_LIMIT),
        state.store.recent_response_events(RECENT_LIMIT),
    );

    let statistics = statistics.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load statistics");
        Statistics::default()
    });
    let access_events = access_events.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load access events");
        Vec::new()
    });
    let response_events = response_events.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load response events");
        Vec::new()
    });

    Json(AdminData {
        success: true,
        statistics,
        geo: state.geo.stats(),
        access_events,
        response_events,
    })
}
