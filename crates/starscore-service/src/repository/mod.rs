mod event_repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use starscore_core::events::{AccessEvent, Engagement, ResponseRecord, Visit};
use thiserror::Error;
use uuid::Uuid;

pub use event_repository::{PgEventStore, ResponseEventRow};

/// Store faults. Recorders log these and carry on; they never reach a caller.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Identifier and server timestamp assigned on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters shown on the admin page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct Statistics {
    pub total_visits: i64,
    pub success_count: i64,
    pub error_count: i64,
    /// Mean processing time of all recorded calls, in seconds, rounded to
    /// two decimals.
    pub avg_response_time: f64,
}

impl Statistics {
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            avg_response_time: (self.avg_response_time * 100.0).round() / 100.0,
            ..self
        }
    }
}

/// Persistent storage for access and response events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Most recent access event for the session and address, optionally
    /// restricted to events created at or after `since`.
    async fn find_latest_access(
        &self,
        session_id: &str,
        user_ip: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<AccessEvent>>;

    async fn insert_access(&self, visit: &Visit) -> Result<InsertedRow>;

    /// Applies client-reported engagement. Returns `false` when no event has
    /// the given id.
    async fn amend_access(&self, id: Uuid, engagement: &Engagement) -> Result<bool>;

    async fn insert_response(&self, record: &ResponseRecord) -> Result<Uuid>;

    async fn statistics(&self) -> Result<Statistics>;

    /// Newest first.
    async fn recent_access_events(&self, limit: i64) -> Result<Vec<AccessEvent>>;

    /// Newest first.
    async fn recent_response_events(&self, limit: i64) -> Result<Vec<ResponseEventRow>>;
}
