//! Approved listing → stored event.
//!
//! Listings are handled strictly one at a time with a fixed pause between
//! them. A listing that fails is parked in `error` with the message kept on
//! the row; the batch always continues.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::db::{Store, StoreError};
use crate::geocode::Geocoder;
use crate::ingest::{self, ValidationError};
use crate::llm::{EventExtractor, ExtractionError};
use crate::models::{Event, EventListing, ListingStatus};
use crate::retry::RetryPolicy;
use crate::scraping::markdown::{extract_images, html_to_markdown};
use crate::scraping::{PageSource, ScrapedListing};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("listing {url} is {status}, not approved")]
    NotApproved { url: String, status: ListingStatus },
    #[error("fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingFailure {
    pub source_url: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub failures: Vec<ListingFailure>,
}

/// Record freshly scraped listings as `pending`; returns how many were new.
pub fn record_listings(store: &Store, listings: &[ScrapedListing]) -> Result<usize, StoreError> {
    let mut inserted = 0;
    for listing in listings {
        if store.insert_listing(listing)? {
            inserted += 1;
        }
    }
    info!(scraped = listings.len(), inserted, "recorded listings");
    Ok(inserted)
}

pub struct Pipeline<'a> {
    store: &'a Store,
    pages: &'a dyn PageSource,
    extractor: &'a dyn EventExtractor,
    geocoder: &'a dyn Geocoder,
    retry: RetryPolicy,
    item_delay: Duration,
    today: NaiveDate,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a Store,
        pages: &'a dyn PageSource,
        extractor: &'a dyn EventExtractor,
        geocoder: &'a dyn Geocoder,
    ) -> Self {
        Self {
            store,
            pages,
            extractor,
            geocoder,
            retry: RetryPolicy::default(),
            item_delay: Duration::from_secs(2),
            today: crate::utils::today(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = delay;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Process every `approved` listing in turn.
    pub async fn process_approved(&self) -> Result<BatchSummary, StoreError> {
        let listings = self.store.list_listings(Some(ListingStatus::Approved))?;
        info!(count = listings.len(), "processing approved listings");

        let mut summary = BatchSummary::default();
        for (index, listing) in listings.iter().enumerate() {
            if index > 0 && !self.item_delay.is_zero() {
                sleep(self.item_delay).await;
            }
            match self.process_listing(&listing.source_url).await {
                Ok(_) => summary.processed += 1,
                Err(err) => {
                    summary.failed += 1;
                    summary.failures.push(ListingFailure {
                        source_url: listing.source_url.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }

    /// Process one listing. Only `approved` listings are accepted; on failure
    /// the listing moves to `error` and the cause is returned.
    #[instrument(skip(self))]
    pub async fn process_listing(&self, source_url: &str) -> Result<Event, PipelineError> {
        let listing = self
            .store
            .get_listing(source_url)?
            .ok_or_else(|| StoreError::NotFound(format!("listing {source_url}")))?;
        if listing.status != ListingStatus::Approved {
            return Err(PipelineError::NotApproved {
                url: listing.source_url,
                status: listing.status,
            });
        }

        match self.build_event(&listing).await {
            Ok(event) => {
                self.store
                    .transition_listing(source_url, ListingStatus::Processed, None)?;
                info!(event = %event.id, name = %event.name, "listing processed");
                Ok(event)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "listing failed");
                let recorded = self.store.transition_listing(
                    source_url,
                    ListingStatus::Error,
                    Some(message.as_str()),
                );
                if let Err(store_err) = recorded {
                    warn!(error = %store_err, "could not record listing failure");
                }
                Err(err)
            }
        }
    }

    async fn build_event(&self, listing: &EventListing) -> Result<Event, PipelineError> {
        let url = listing.source_url.as_str();
        let pages = self.pages;
        let html = self
            .retry
            .run("fetch", move || pages.fetch_page(url))
            .await
            .map_err(PipelineError::Fetch)?;

        let markdown = html_to_markdown(&html, url);
        let extractor = self.extractor;
        let text = markdown.as_str();
        let extracted = self
            .retry
            .run("extract", move || extractor.extract(text, url))
            .await?;

        let mut event = ingest::normalize(extracted, listing, self.today)?;
        ingest::resolve_coordinates(&mut event, self.geocoder, &self.retry).await;

        for image in extract_images(&markdown) {
            if !event.images.contains(&image) {
                event.images.push(image);
            }
        }

        self.store.upsert_event(&event)?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeError;
    use crate::models::{Coordinates, EventStatus, ExtractedEvent, StoreType};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakePages(HashMap<String, String>);

    #[async_trait]
    impl PageSource for FakePages {
        async fn fetch_page(&self, url: &str) -> anyhow::Result<String> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 for {url}"))
        }
    }

    struct FakeExtractor;

    #[async_trait]
    impl EventExtractor for FakeExtractor {
        async fn extract(
            &self,
            markdown: &str,
            source_url: &str,
        ) -> Result<ExtractedEvent, ExtractionError> {
            if source_url.ends_with("/advert") {
                return Err(ExtractionError::Refused("not an event".into()));
            }
            Ok(ExtractedEvent {
                name: crate::scraping::markdown::extract_title(markdown)
                    .unwrap_or_else(|| "Untitled".into()),
                raw_date_text: Some("1 Jun 2025 - 30 Jun 2025".into()),
                raw_time_text: Some("10am - 10pm".into()),
                location: "Sentosa".into(),
                description: "Family day out.".into(),
                category_ids: vec![3],
                store_type: StoreType::Event,
                coordinates: None,
                opening_hours: Vec::new(),
            })
        }
    }

    struct FixedGeocoder;

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, _location: &str) -> Result<Option<Coordinates>, GeocodeError> {
            Ok(Some(Coordinates {
                latitude: 1.2540,
                longitude: 103.8238,
            }))
        }
    }

    const GOOD: &str = "https://example.sg/sentosa-fest";
    const ADVERT: &str = "https://example.sg/advert";
    const MISSING: &str = "https://example.sg/gone";

    fn scraped(url: &str) -> ScrapedListing {
        ScrapedListing {
            title: url.rsplit('/').next().unwrap_or_default().to_string(),
            article_url: url.to_string(),
            image_url: Some("https://example.sg/card.jpg".into()),
        }
    }

    fn pages() -> FakePages {
        let mut map = HashMap::new();
        map.insert(
            GOOD.to_string(),
            r#"<article><h1>Sentosa Fest</h1><img src="/hero.jpg"><p>Fun.</p></article>"#
                .to_string(),
        );
        map.insert(
            ADVERT.to_string(),
            "<article><h1>Buy now</h1></article>".to_string(),
        );
        FakePages(map)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
    }

    fn seeded_store(urls: &[&str]) -> Store {
        let store = Store::open_in_memory().expect("store");
        let listings = urls.iter().map(|u| scraped(u)).collect::<Vec<_>>();
        assert_eq!(record_listings(&store, &listings).expect("record"), urls.len());
        for url in urls {
            store
                .transition_listing(url, ListingStatus::Approved, None)
                .expect("approve");
        }
        store
    }

    #[tokio::test]
    async fn processes_approved_listing_into_event() {
        let store = seeded_store(&[GOOD]);
        let pages = pages();
        let pipeline = Pipeline::new(&store, &pages, &FakeExtractor, &FixedGeocoder)
            .with_retry(RetryPolicy::once())
            .with_item_delay(Duration::ZERO)
            .with_today(today());

        let event = pipeline.process_listing(GOOD).await.expect("processed");
        assert_eq!(event.name, "Sentosa Fest");
        assert_eq!(event.location, "Resorts World Sentosa");
        assert_eq!(event.start_date.as_deref(), Some("2025-06-01"));
        assert_eq!(event.end_date.as_deref(), Some("2025-06-30"));
        assert_eq!(event.latitude, Some(1.2540));
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(
            event.images,
            vec![
                "https://example.sg/card.jpg".to_string(),
                "https://example.sg/hero.jpg".to_string(),
            ]
        );

        let stored = store.get_event(&event.id).expect("query").expect("stored");
        assert_eq!(stored, event);
        let listing = store.get_listing(GOOD).expect("query").expect("listing");
        assert_eq!(listing.status, ListingStatus::Processed);
    }

    #[tokio::test]
    async fn batch_continues_past_failures() {
        let store = seeded_store(&[GOOD, ADVERT, MISSING]);
        let pages = pages();
        let pipeline = Pipeline::new(&store, &pages, &FakeExtractor, &FixedGeocoder)
            .with_retry(RetryPolicy::once())
            .with_item_delay(Duration::ZERO)
            .with_today(today());

        let summary = pipeline.process_approved().await.expect("batch");
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 2);

        let advert = store.get_listing(ADVERT).expect("query").expect("listing");
        assert_eq!(advert.status, ListingStatus::Error);
        assert!(advert
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("not an event"));

        let missing = store.get_listing(MISSING).expect("query").expect("listing");
        assert_eq!(missing.status, ListingStatus::Error);
        assert!(summary
            .failures
            .iter()
            .any(|f| f.source_url == MISSING && f.message.contains("fetch failed")));

        assert_eq!(store.list_events(None).expect("events").len(), 1);
    }

    #[tokio::test]
    async fn refuses_listings_that_are_not_approved() {
        let store = Store::open_in_memory().expect("store");
        record_listings(&store, &[scraped(GOOD)]).expect("record");
        let pages = pages();
        let pipeline = Pipeline::new(&store, &pages, &FakeExtractor, &FixedGeocoder)
            .with_retry(RetryPolicy::once());

        let err = pipeline.process_listing(GOOD).await.expect_err("pending");
        assert!(matches!(
            err,
            PipelineError::NotApproved {
                status: ListingStatus::Pending,
                ..
            }
        ));
        let listing = store.get_listing(GOOD).expect("query").expect("listing");
        assert_eq!(listing.status, ListingStatus::Pending);
    }

    #[tokio::test]
    async fn errored_listing_can_be_retried() {
        let store = seeded_store(&[MISSING]);
        let empty = FakePages(HashMap::new());
        let pipeline = Pipeline::new(&store, &empty, &FakeExtractor, &FixedGeocoder)
            .with_retry(RetryPolicy::once())
            .with_today(today());
        assert!(pipeline.process_listing(MISSING).await.is_err());

        let listing = store.retry_listing(MISSING).expect("retry");
        assert_eq!(listing.status, ListingStatus::Approved);
        assert_eq!(listing.error_message, None);

        let mut map = HashMap::new();
        map.insert(
            MISSING.to_string(),
            "<article><h1>Gone Fest</h1><p>Back again.</p></article>".to_string(),
        );
        let restored = FakePages(map);
        let pipeline = Pipeline::new(&store, &restored, &FakeExtractor, &FixedGeocoder)
            .with_retry(RetryPolicy::once())
            .with_today(today());
        pipeline.process_listing(MISSING).await.expect("second attempt");

        let listing = store.get_listing(MISSING).expect("query").expect("listing");
        assert_eq!(listing.status, ListingStatus::Processed);
        assert_eq!(listing.error_message, None);
        assert_eq!(store.list_events(None).expect("events").len(), 1);

        let err = pipeline.process_listing(MISSING).await.expect_err("processed");
        assert!(matches!(
            err,
            PipelineError::NotApproved {
                status: ListingStatus::Processed,
                ..
            }
        ));
    }
}
