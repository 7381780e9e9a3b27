use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, types::Json};
use starscore_core::{
    GeoLocation,
    events::{
        AccessEvent, DeviceInfo, DeviceType, Engagement, ExitType, Outcome, ResponseRecord,
        UserAction, UtmParams, Visit,
    },
    time::to_beijing,
};
use tracing::instrument;
use uuid::Uuid;

use super::{EventStore, InsertedRow, Result, Statistics};

const ACCESS_COLUMNS: &str = r"
    id, session_id, user_ip, user_agent, device_type, browser, os, is_mobile,
    referrer, utm_source, utm_medium, country, region, city, isp,
    page_load_time, time_on_page, actions, exit_type,
    screen_resolution, viewport_size, language, timezone,
    beijing_time, created_at
";

#[derive(Debug, sqlx::FromRow)]
struct AccessEventRow {
    id: Uuid,
    session_id: String,
    user_ip: String,
    user_agent: String,
    device_type: String,
    browser: String,
    os: String,
    is_mobile: bool,
    referrer: Option<String>,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    country: String,
    region: String,
    city: String,
    isp: String,
    page_load_time: Option<f64>,
    time_on_page: Option<f64>,
    actions: Json<Vec<UserAction>>,
    exit_type: Option<String>,
    screen_resolution: Option<String>,
    viewport_size: Option<String>,
    language: Option<String>,
    timezone: Option<String>,
    beijing_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<AccessEventRow> for AccessEvent {
    fn from(row: AccessEventRow) -> Self {
        Self {
            id: row.id,
            visit: Visit {
                session_id: row.session_id,
                user_ip: row.user_ip,
                user_agent: row.user_agent,
                device: DeviceInfo {
                    device_type: DeviceType::parse(&row.device_type),
                    browser: row.browser,
                    os: row.os,
                    is_mobile: row.is_mobile,
                },
                referrer: row.referrer,
                utm: UtmParams {
                    utm_source: row.utm_source,
                    utm_medium: row.utm_medium,
                },
                location: GeoLocation::new(row.country, row.region, row.city, row.isp),
                engagement: Engagement {
                    time_on_page: row.time_on_page,
                    actions: row.actions.0,
                    exit_type: row.exit_type.as_deref().and_then(ExitType::parse),
                    page_load_time: row.page_load_time,
                },
                screen_resolution: row.screen_resolution,
                viewport_size: row.viewport_size,
                language: row.language,
                timezone: row.timezone,
                beijing_time: to_beijing(row.beijing_time),
            },
            created_at: row.created_at,
        }
    }
}

/// A stored response event as listed on the admin page.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResponseEventRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub access_event_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub request_size: i64,
    pub image_format: Option<String>,
    pub image_size: Option<i64>,
    pub image_quality: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub processing_time: f64,
    pub api_time: Option<f64>,
    pub internal_time: f64,
    pub status: String,
    pub status_code: i32,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: i32,
    pub recognition_result: Option<Json<Value>>,
    pub calculated_scores: Option<Json<Value>>,
    pub confidence_score: Option<f64>,
    pub user_impact: String,
    pub business_impact: String,
    #[sqlx(try_from = "StoredBeijingTime")]
    pub beijing_time: DateTime<FixedOffset>,
    pub created_at: DateTime<Utc>,
}

/// A `beijing_time` column, read back as UTC+8 civil time.
#[derive(sqlx::Type)]
#[sqlx(transparent)]
pub(crate) struct StoredBeijingTime(DateTime<Utc>);

impl From<StoredBeijingTime> for DateTime<FixedOffset> {
    fn from(stored: StoredBeijingTime) -> Self {
        to_beijing(stored.0)
    }
}

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl EventStore for PgEventStore {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_latest_access(
        &self,
        session_id: &str,
        user_ip: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<AccessEvent>> {
        let row = sqlx::query_as::<_, AccessEventRow>(&format!(
            r"
            SELECT {ACCESS_COLUMNS}
            FROM access_events
            WHERE session_id = $1
              AND user_ip = $2
              AND ($3::timestamptz IS NULL OR created_at >= $3)
            ORDER BY created_at DESC
            LIMIT 1
            "
        ))
        .bind(session_id)
        .bind(user_ip)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AccessEvent::from))
    }

    #[instrument(skip(self, visit), fields(session_id = %visit.session_id))]
    async fn insert_access(&self, visit: &Visit) -> Result<InsertedRow> {
        let (id, created_at) = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r"
            INSERT INTO access_events (
                session_id, user_ip, user_agent, device_type, browser, os, is_mobile,
                referrer, utm_source, utm_medium, country, region, city, isp,
                page_load_time, time_on_page, actions, exit_type,
                screen_resolution, viewport_size, language, timezone, beijing_time
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
            )
            RETURNING id, created_at
            ",
        )
        .bind(&visit.session_id)
        .bind(&visit.user_ip)
        .bind(&visit.user_agent)
        .bind(visit.device.device_type.as_str())
        .bind(&visit.device.browser)
        .bind(&visit.device.os)
        .bind(visit.device.is_mobile)
        .bind(&visit.referrer)
        .bind(&visit.utm.utm_source)
        .bind(&visit.utm.utm_medium)
        .bind(&visit.location.country)
        .bind(&visit.location.region)
        .bind(&visit.location.city)
        .bind(&visit.location.isp)
        .bind(visit.engagement.page_load_time)
        .bind(visit.engagement.time_on_page)
        .bind(Json(&visit.engagement.actions))
        .bind(visit.engagement.exit_type.map(ExitType::as_str))
        .bind(&visit.screen_resolution)
        .bind(&visit.viewport_size)
        .bind(&visit.language)
        .bind(&visit.timezone)
        .bind(visit.beijing_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(InsertedRow { id, created_at })
    }

    #[instrument(skip(self, engagement))]
    async fn amend_access(&self, id: Uuid, engagement: &Engagement) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE access_events
            SET time_on_page = COALESCE($2, time_on_page),
                actions = $3,
                exit_type = COALESCE($4, exit_type),
                page_load_time = COALESCE(page_load_time, $5)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(engagement.time_on_page)
        .bind(Json(&engagement.actions))
        .bind(engagement.exit_type.map(ExitType::as_str))
        .bind(engagement.page_load_time)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, record), fields(request_id = %record.request_id))]
    async fn insert_response(&self, record: &ResponseRecord) -> Result<Uuid> {
        let call = &record.call;
        let image = call.image_info.as_ref();
        let (payload, failure) = match &call.outcome {
            Outcome::Success(payload) => (Some(payload), None),
            Outcome::Error(detail) => (None, Some(detail)),
        };

        let id = sqlx::query_scalar::<_, Uuid>(
            r"
            INSERT INTO response_events (
                request_id, access_event_id, endpoint, method, request_size,
                image_format, image_size, image_quality,
                start_time, end_time, processing_time, api_time, internal_time,
                status, status_code, error_type, error_message, error_code, retry_count,
                recognition_result, calculated_scores, confidence_score,
                user_impact, business_impact, beijing_time
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )
            RETURNING id
            ",
        )
        .bind(record.request_id)
        .bind(record.access_event_id)
        .bind(&call.endpoint)
        .bind(&call.method)
        .bind(to_i64(call.request_size))
        .bind(image.and_then(|i| i.format.as_deref()))
        .bind(image.map(|i| to_i64(i.byte_size)))
        .bind(image.map(|i| i.quality.as_str()))
        .bind(call.timing.start_time)
        .bind(call.timing.end_time)
        .bind(call.timing.processing_time)
        .bind(call.timing.api_time)
        .bind(call.timing.internal_time)
        .bind(call.outcome.status().as_str())
        .bind(i32::from(call.status_code))
        .bind(failure.map(|f| f.error_type.as_str()))
        .bind(failure.map(|f| f.error_message.as_str()))
        .bind(failure.and_then(|f| f.error_code.as_deref()))
        .bind(i32::try_from(call.retry_count).unwrap_or(i32::MAX))
        .bind(payload.map(|p| Json(&p.recognition_result)))
        .bind(payload.map(|p| Json(&p.calculated_scores)))
        .bind(payload.map(|p| p.confidence_score))
        .bind(record.user_impact.as_str())
        .bind(record.business_impact.as_str())
        .bind(record.beijing_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    #[instrument(skip(self))]
    async fn statistics(&self) -> Result<Statistics> {
        let stats = sqlx::query_as::<_, Statistics>(
            r"
            SELECT
                (SELECT COUNT(*) FROM access_events) AS total_visits,
                COUNT(*) FILTER (WHERE status = 'success') AS success_count,
                COUNT(*) FILTER (WHERE status = 'error') AS error_count,
                COALESCE(AVG(processing_time), 0)::DOUBLE PRECISION AS avg_response_time
            FROM response_events
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats.rounded())
    }

    #[instrument(skip(self))]
    async fn recent_access_events(&self, limit: i64) -> Result<Vec<AccessEvent>> {
        let rows = sqlx::query_as::<_, AccessEventRow>(&format!(
            r"
            SELECT {ACCESS_COLUMNS}
            FROM access_events
            ORDER BY created_at DESC
            LIMIT $1
            "
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AccessEvent::from).collect())
    }

    #[instrument(skip(self))]
    async fn recent_response_events(&self, limit: i64) -> Result<Vec<ResponseEventRow>> {
        let rows = sqlx::query_as::<_, ResponseEventRow>(
            r"
            SELECT
                id, request_id, access_event_id, endpoint, method, request_size,
                image_format, image_size, image_quality,
                start_time, end_time, processing_time, api_time, internal_time,
                status, status_code, error_type, error_message, error_code, retry_count,
                recognition_result, calculated_scores, confidence_score,
                user_impact, business_impact, beijing_time, created_at
            FROM response_events
            ORDER BY created_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn stored_row(created_at: DateTime<Utc>) -> ResponseEventRow {
        ResponseEventRow {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            access_event_id: None,
            endpoint: "/api/recognize".to_string(),
            method: "POST".to_string(),
            request_size: 2048,
            image_format: Some("png".to_string()),
            image_size: Some(1500),
            image_quality: Some("poor".to_string()),
            start_time: created_at,
            end_time: created_at,
            processing_time: 1.2,
            api_time: Some(1.0),
            internal_time: 0.2,
            status: "success".to_string(),
            status_code: 200,
            error_type: None,
            error_message: None,
            error_code: None,
            retry_count: 0,
            recognition_result: Some(Json(json!({"5星": 3}))),
            calculated_scores: None,
            confidence_score: Some(0.6),
            user_impact: "low".to_string(),
            business_impact: "low".to_string(),
            beijing_time: StoredBeijingTime(created_at).into(),
            created_at,
        }
    }

    #[test]
    fn response_row_reports_beijing_civil_time() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 17, 30, 0).unwrap();
        let value = serde_json::to_value(stored_row(created_at)).unwrap();

        assert_eq!(value["beijing_time"], "2024-05-02T01:30:00+08:00");
        assert_eq!(value["created_at"], "2024-05-01T17:30:00Z");
        assert_eq!(value["recognition_result"]["5星"], 3);
    }

    #[test]
    fn response_row_matches_access_event_clock() {
        let created_at = Utc.with_ymd_and_hms(2024, 12, 31, 16, 0, 0).unwrap();
        let row = stored_row(created_at);
        assert_eq!(row.beijing_time, to_beijing(created_at));
    }

    #[test]
    fn client_supplied_columns_are_unbounded() {
        let access = include_str!("../../migrations/20250101000000_create_access_events.sql");
        let response = include_str!("../../migrations/20250101000001_create_response_events.sql");
        let column_type = |sql: &'static str, column: &str| {
            sql.lines()
                .map(str::trim)
                .find(|line| line.split_whitespace().next() == Some(column))
                .and_then(|line| line.split_whitespace().nth(1))
                .map(|ty| ty.trim_end_matches(','))
        };

        for column in [
            "user_ip",
            "user_agent",
            "browser",
            "os",
            "referrer",
            "screen_resolution",
            "viewport_size",
            "language",
            "timezone",
        ] {
            assert_eq!(column_type(access, column), Some("TEXT"), "{column}");
        }
        assert_eq!(column_type(response, "image_format"), Some("TEXT"));
    }
}
