use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use starscore_core::{
    GeoResolver,
    events::{AccessEvent, Engagement, Visit, VisitContext},
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::repository::EventStore;

pub struct AccessEventRecorder {
    store: Arc<dyn EventStore>,
    geo: Arc<GeoResolver>,
    session_window: Option<TimeDelta>,
}

impl AccessEventRecorder {
    /// `session_window` bounds how old a reusable access event may be;
    /// `None` reuses the latest match regardless of age.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        geo: Arc<GeoResolver>,
        session_window: Option<TimeDelta>,
    ) -> Self {
        Self {
            store,
            geo,
            session_window,
        }
    }

    /// Returns the latest access event for `(session_id, address)`, creating
    /// one when none exists.
    ///
    /// Concurrent first visits for one session may both create an event.
    /// A failed lookup falls through to creation; a failed insert yields
    /// `None`.
    #[instrument(skip(self, user_agent, context))]
    pub async fn find_or_create(
        &self,
        address: &str,
        user_agent: &str,
        session_id: &str,
        context: VisitContext,
    ) -> Option<AccessEvent> {
        let now = Utc::now();
        let since = self
            .session_window
            .and_then(|window| now.checked_sub_signed(window));

        match self
            .store
            .find_latest_access(session_id, address, since)
            .await
        {
            Ok(Some(existing)) => {
                debug!(access_event_id = %existing.id, "Reusing access event");
                return Some(existing);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Access event lookup failed, recording a new visit"),
        }

        let location = self.geo.resolve(address);
        let visit = Visit::new(address, user_agent, session_id, context, location, now);

        match self.store.insert_access(&visit).await {
            Ok(row) => {
                info!(
                    access_event_id = %row.id,
                    browser = %visit.device.browser,
                    country = %visit.location.country,
                    "Access event recorded"
                );
                Some(AccessEvent {
                    id: row.id,
                    visit,
                    created_at: row.created_at,
                })
            }
            Err(e) => {
                error!(error = %e, "Failed to store access event");
                None
            }
        }
    }

    /// Applies client-reported engagement. Unknown ids and store failures are
    /// logged and otherwise ignored.
    #[instrument(skip(self, engagement))]
    pub async fn amend(&self, id: Uuid, engagement: &Engagement) {
        match self.store.amend_access(id, engagement).await {
            Ok(true) => debug!("Access event amended"),
            Ok(false) => debug!("No access event to amend"),
            Err(e) => warn!(error = %e, "Failed to amend access event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use starscore_core::{GeoLocation, events::ExitType};

    use super::*;
    use crate::repository::{InsertedRow, MockEventStore, PersistenceError};

    const UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148 Safari/604.1";

    fn recorder(store: MockEventStore, window: Option<TimeDelta>) -> AccessEventRecorder {
        AccessEventRecorder::new(Arc::new(store), Arc::new(GeoResolver::default()), window)
    }

    fn stored_event(session_id: &str, address: &str) -> AccessEvent {
        AccessEvent {
            id: Uuid::new_v4(),
            visit: Visit::new(
                address,
                UA,
                session_id,
                VisitContext::default(),
                GeoLocation::unknown(),
                Utc::now(),
            ),
            created_at: Utc::now(),
        }
    }

    fn unavailable() -> PersistenceError {
        PersistenceError::Database(sqlx::Error::PoolTimedOut)
    }

    #[tokio::test]
    async fn reuses_existing_event() {
        let existing = stored_event("abc", "8.8.8.8");
        let expected_id = existing.id;

        let mut store = MockEventStore::new();
        store
            .expect_find_latest_access()
            .withf(|session, ip, since| session == "abc" && ip == "8.8.8.8" && since.is_none())
            .returning(move |_, _, _| Ok(Some(existing.clone())));
        store.expect_insert_access().never();

        let event = recorder(store, None)
            .find_or_create("8.8.8.8", UA, "abc", VisitContext::default())
            .await
            .unwrap();
        assert_eq!(event.id, expected_id);
    }

    #[tokio::test]
    async fn creates_enriched_event_when_none_exists() {
        let id = Uuid::new_v4();
        let mut store = MockEventStore::new();
        store
            .expect_find_latest_access()
            .returning(|_, _, _| Ok(None));
        store
            .expect_insert_access()
            .withf(|visit| visit.session_id == "abc" && visit.device.os == "iOS")
            .times(1)
            .returning(move |_| {
                Ok(InsertedRow {
                    id,
                    created_at: Utc::now(),
                })
            });

        let context = VisitContext {
            referrer: Some("https://example.com/?utm_source=wechat&utm_medium=social".into()),
            language: Some("zh-CN".into()),
            ..VisitContext::default()
        };
        let event = recorder(store, None)
            .find_or_create("192.168.1.20", UA, "abc", context)
            .await
            .unwrap();

        assert_eq!(event.id, id);
        assert_eq!(event.visit.location, GeoLocation::private_network());
        assert_eq!(event.visit.utm.utm_source.as_deref(), Some("wechat"));
        assert_eq!(event.visit.language.as_deref(), Some("zh-CN"));
        assert!(event.visit.device.is_mobile);
        assert_eq!(event.visit.engagement.exit_type, None);
    }

    #[tokio::test]
    async fn lookup_failure_still_creates() {
        let mut store = MockEventStore::new();
        store
            .expect_find_latest_access()
            .returning(|_, _, _| Err(unavailable()));
        store.expect_insert_access().times(1).returning(|_| {
            Ok(InsertedRow {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
            })
        });

        let event = recorder(store, None)
            .find_or_create("127.0.0.1", UA, "abc", VisitContext::default())
            .await;
        assert_eq!(event.unwrap().visit.location, GeoLocation::local());
    }

    #[tokio::test]
    async fn insert_failure_yields_none() {
        let mut store = MockEventStore::new();
        store
            .expect_find_latest_access()
            .returning(|_, _, _| Ok(None));
        store
            .expect_insert_access()
            .returning(|_| Err(unavailable()));

        let event = recorder(store, None)
            .find_or_create("8.8.8.8", UA, "abc", VisitContext::default())
            .await;
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn session_window_bounds_the_lookup() {
        let before = Utc::now() - TimeDelta::minutes(30);
        let mut store = MockEventStore::new();
        store
            .expect_find_latest_access()
            .withf(move |_, _, since| since.is_some_and(|s| s >= before))
            .returning(|_, _, _| Ok(Some(stored_event("abc", "8.8.8.8"))));

        let event = recorder(store, TimeDelta::try_minutes(30))
            .find_or_create("8.8.8.8", UA, "abc", VisitContext::default())
            .await;
        assert!(event.is_some());
    }

    #[tokio::test]
    async fn amend_swallows_store_errors() {
        let id = Uuid::new_v4();
        let engagement = Engagement {
            time_on_page: Some(42.0),
            exit_type: Some(ExitType::Normal),
            ..Engagement::default()
        };

        let mut store = MockEventStore::new();
        store
            .expect_amend_access()
            .with(eq(id), eq(engagement.clone()))
            .times(1)
            .returning(|_, _| Err(unavailable()));

        recorder(store, None).amend(id, &engagement).await;
    }

    #[tokio::test]
    async fn amend_of_unknown_id_is_a_no_op() {
        let mut store = MockEventStore::new();
        store.expect_amend_access().returning(|_, _| Ok(false));

        recorder(store, None)
            .amend(Uuid::new_v4(), &Engagement::default())
            .await;
    }
}
