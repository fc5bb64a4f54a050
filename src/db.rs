use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Event, EventListing, EventStatus, ListingStatus, TransitionError};
use crate::scraping::ScrapedListing;
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub struct Store {
    conn: Connection,
}

const LISTING_COLUMNS: &str =
    "title, source_url, image_url, status, error_message, created_at_utc, updated_at_utc";

impl Store {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&utils::database_path())
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS listings(
                source_url TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                image_url TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at_utc TEXT NOT NULL,
                updated_at_utc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                source_url TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                first_seen_utc TEXT NOT NULL,
                last_seen_utc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS listings_status ON listings(status);
            CREATE INDEX IF NOT EXISTS events_status ON events(status);",
        )?;
        Ok(())
    }

    /// Store a freshly scraped listing as `pending`. Known URLs are left alone.
    pub fn insert_listing(&self, listing: &ScrapedListing) -> Result<bool, StoreError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO listings
               (source_url, title, image_url, status, error_message, created_at_utc, updated_at_utc)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
            params![
                listing.article_url,
                listing.title,
                listing.image_url,
                ListingStatus::Pending.as_str(),
                now
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_listing(&self, source_url: &str) -> Result<Option<EventListing>, StoreError> {
        let listing = self
            .conn
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE source_url = ?1"),
                params![source_url],
                listing_from_row,
            )
            .optional()?;
        Ok(listing)
    }

    pub fn list_listings(
        &self,
        status: Option<ListingStatus>,
    ) -> Result<Vec<EventListing>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at_utc, source_url"
        ))?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str())], listing_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Move a listing through the moderation state machine.
    ///
    /// `error_message` is recorded for `error`; approving clears it.
    pub fn transition_listing(
        &self,
        source_url: &str,
        next: ListingStatus,
        error_message: Option<&str>,
    ) -> Result<EventListing, StoreError> {
        let current = self
            .get_listing(source_url)?
            .ok_or_else(|| StoreError::NotFound(format!("listing {source_url}")))?;
        let next = current.status.transition(next)?;
        let message = match next {
            ListingStatus::Error => error_message,
            _ => None,
        };

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE listings SET status = ?2, error_message = ?3, updated_at_utc = ?4
             WHERE source_url = ?1",
            params![source_url, next.as_str(), message, now],
        )?;
        debug!(source_url, from = %current.status, to = %next, "listing transition");

        self.get_listing(source_url)?
            .ok_or_else(|| StoreError::NotFound(format!("listing {source_url}")))
    }

    /// Manual retry: only an `error` listing goes back to `approved`.
    pub fn retry_listing(&self, source_url: &str) -> Result<EventListing, StoreError> {
        let current = self
            .get_listing(source_url)?
            .ok_or_else(|| StoreError::NotFound(format!("listing {source_url}")))?;
        if current.status != ListingStatus::Error {
            return Err(StoreError::Transition(TransitionError {
                kind: "retry",
                from: current.status.to_string(),
                to: ListingStatus::Approved.to_string(),
            }));
        }
        self.transition_listing(source_url, ListingStatus::Approved, None)
    }

    /// Insert or refresh an event. An existing row keeps its moderation status.
    pub fn upsert_event(&self, event: &Event) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT INTO events (id, source_url, status, payload, first_seen_utc, last_seen_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
               payload = excluded.payload,
               last_seen_utc = excluded.last_seen_utc",
            params![event.id, event.source_url, event.status.as_str(), payload, now],
        )?;
        Ok(())
    }

    pub fn get_event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT payload, status FROM events WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(payload, status)| decode_event(&payload, &status))
            .transpose()
    }

    pub fn list_events(&self, status: Option<EventStatus>) -> Result<Vec<Event>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload, status FROM events
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY first_seen_utc, id",
        )?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str())], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (payload, status) = row?;
            out.push(decode_event(&payload, &status)?);
        }
        Ok(out)
    }

    pub fn set_event_status(&self, id: &str, next: EventStatus) -> Result<Event, StoreError> {
        let mut event = self
            .get_event(id)?
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")))?;
        event.status = event.status.transition(next)?;
        let payload = serde_json::to_string(&event)?;
        self.conn.execute(
            "UPDATE events SET status = ?2, payload = ?3, last_seen_utc = ?4 WHERE id = ?1",
            params![id, event.status.as_str(), payload, Utc::now().to_rfc3339()],
        )?;
        Ok(event)
    }

    pub fn delete_event(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Expire events whose last ISO date is before `today`.
    pub fn expire_events(&self, today: NaiveDate) -> Result<usize, StoreError> {
        let mut expired = 0;
        for status in [EventStatus::Pending, EventStatus::Approved] {
            for event in self.list_events(Some(status))? {
                if ends_before(&event, today) {
                    self.set_event_status(&event.id, EventStatus::Expired)?;
                    expired += 1;
                }
            }
        }
        if expired > 0 {
            info!(expired, %today, "expired past events");
        }
        Ok(expired)
    }
}

fn ends_before(event: &Event, today: NaiveDate) -> bool {
    let last = event.end_date.as_deref().or(event.start_date.as_deref());
    match last.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        Some(last) => last < today,
        None => false,
    }
}

fn decode_event(payload: &str, status: &str) -> Result<Event, StoreError> {
    let mut event: Event = serde_json::from_str(payload)?;
    if let Ok(status) = status.parse::<EventStatus>() {
        event.status = status;
    }
    Ok(event)
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<EventListing> {
    let status_text: String = row.get(3)?;
    let status = status_text.parse::<ListingStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(err),
        )
    })?;
    Ok(EventListing {
        title: row.get(0)?,
        source_url: row.get(1)?,
        image_url: row.get(2)?,
        status,
        error_message: row.get(4)?,
        created_at_utc: row.get(5)?,
        updated_at_utc: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpeningHours, StoreType};

    fn scraped(url: &str) -> ScrapedListing {
        ScrapedListing {
            title: format!("Listing {url}"),
            article_url: url.to_string(),
            image_url: None,
        }
    }

    fn event(id: &str, start: Option<&str>, end: Option<&str>) -> Event {
        Event {
            id: id.to_string(),
            source_url: format!("https://example.sg/{id}"),
            name: format!("Event {id}"),
            description: String::new(),
            location: "Esplanade".into(),
            date: None,
            start_date: start.map(str::to_string),
            end_date: end.map(str::to_string),
            time: "10am - 6pm".into(),
            category_ids: vec![1],
            store_type: StoreType::Event,
            latitude: None,
            longitude: None,
            opening_hours: OpeningHours::default(),
            images: Vec::new(),
            status: EventStatus::Pending,
            created_at_utc: "2025-06-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn duplicate_listings_are_ignored() {
        let store = Store::open_in_memory().expect("store");
        assert!(store.insert_listing(&scraped("https://a.sg/1")).expect("insert"));
        assert!(!store.insert_listing(&scraped("https://a.sg/1")).expect("insert"));
        let all = store.list_listings(None).expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, ListingStatus::Pending);
    }

    #[test]
    fn listing_state_machine_is_enforced() {
        let store = Store::open_in_memory().expect("store");
        let url = "https://a.sg/2";
        store.insert_listing(&scraped(url)).expect("insert");

        store
            .transition_listing(url, ListingStatus::Approved, None)
            .expect("approve");
        let failed = store
            .transition_listing(url, ListingStatus::Error, Some("extractor refused"))
            .expect("error");
        assert_eq!(failed.error_message.as_deref(), Some("extractor refused"));

        let retried = store
            .transition_listing(url, ListingStatus::Approved, None)
            .expect("retry");
        assert_eq!(retried.error_message, None);
        store
            .transition_listing(url, ListingStatus::Processed, None)
            .expect("process");

        let err = store
            .transition_listing(url, ListingStatus::Approved, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        assert_eq!(
            store.get_listing(url).expect("get").map(|l| l.status),
            Some(ListingStatus::Processed)
        );
    }

    #[test]
    fn retry_only_applies_to_errored_listings() {
        let store = Store::open_in_memory().expect("store");
        let url = "https://a.sg/retry";
        store.insert_listing(&scraped(url)).expect("insert");

        let err = store.retry_listing(url).unwrap_err();
        assert!(matches!(err, StoreError::Transition(ref t) if t.from == "pending"));
        assert_eq!(
            store.get_listing(url).expect("get").map(|l| l.status),
            Some(ListingStatus::Pending)
        );

        store
            .transition_listing(url, ListingStatus::Approved, None)
            .expect("approve");
        store
            .transition_listing(url, ListingStatus::Error, Some("timeout"))
            .expect("error");
        let retried = store.retry_listing(url).expect("retry");
        assert_eq!(retried.status, ListingStatus::Approved);
        assert_eq!(retried.error_message, None);
    }

    #[test]
    fn unknown_listing_is_not_found() {
        let store = Store::open_in_memory().expect("store");
        let err = store
            .transition_listing("https://nope.sg", ListingStatus::Approved, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn filters_listings_by_status() {
        let store = Store::open_in_memory().expect("store");
        for url in ["https://a.sg/1", "https://a.sg/2", "https://a.sg/3"] {
            store.insert_listing(&scraped(url)).expect("insert");
        }
        store
            .transition_listing("https://a.sg/2", ListingStatus::Rejected, None)
            .expect("reject");
        let pending = store
            .list_listings(Some(ListingStatus::Pending))
            .expect("list");
        assert_eq!(pending.len(), 2);
        let rejected = store
            .list_listings(Some(ListingStatus::Rejected))
            .expect("list");
        assert_eq!(rejected[0].source_url, "https://a.sg/2");
    }

    #[test]
    fn upsert_keeps_moderation_status() {
        let store = Store::open_in_memory().expect("store");
        let mut e = event("e1", Some("2025-06-01"), None);
        store.upsert_event(&e).expect("insert");
        store
            .set_event_status("e1", EventStatus::Approved)
            .expect("approve");

        e.name = "Renamed".into();
        store.upsert_event(&e).expect("refresh");
        let stored = store.get_event("e1").expect("get").expect("exists");
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.status, EventStatus::Approved);
    }

    #[test]
    fn expires_only_past_iso_dates() {
        let store = Store::open_in_memory().expect("store");
        store
            .upsert_event(&event("past", Some("2025-05-01"), Some("2025-05-20")))
            .expect("insert");
        store
            .upsert_event(&event("running", Some("2025-05-01"), Some("2025-07-01")))
            .expect("insert");
        store
            .upsert_event(&event("single", Some("2025-05-30"), None))
            .expect("insert");
        store
            .upsert_event(&event("vague", Some("Every Friday"), None))
            .expect("insert");

        let today = NaiveDate::from_ymd_opt(2025, 6, 1).expect("date");
        assert_eq!(store.expire_events(today).expect("expire"), 2);
        let expired = store
            .list_events(Some(EventStatus::Expired))
            .expect("list")
            .into_iter()
            .map(|e| e.id)
            .collect::<Vec<_>>();
        assert_eq!(expired, vec!["past".to_string(), "single".to_string()]);
    }

    #[test]
    fn delete_and_invalid_status_changes() {
        let store = Store::open_in_memory().expect("store");
        store
            .upsert_event(&event("e2", None, None))
            .expect("insert");
        store
            .set_event_status("e2", EventStatus::Expired)
            .expect("expire");
        assert!(store
            .set_event_status("e2", EventStatus::Approved)
            .is_err());
        assert!(store.delete_event("e2").expect("delete"));
        assert!(!store.delete_event("e2").expect("delete"));
        assert!(store.get_event("e2").expect("get").is_none());
    }
}
