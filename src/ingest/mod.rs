//! Deterministic post-processing of extracted event fields before they are
//! persisted: date ranges, sentinels, category checks, landmark rewriting
//! and coordinate resolution.

pub mod dates;
pub mod landmarks;

use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::geocode::Geocoder;
use crate::hours::TIME_SENTINEL;
use crate::models::{
    is_valid_category, Coordinates, Event, EventListing, EventStatus, ExtractedEvent,
    OpeningHours, StoreType,
};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("category_ids must be an array of integers")]
    CategoriesNotArray,
    #[error("category_ids must not be empty")]
    NoCategories,
    #[error("category id {0} is outside 1..=20")]
    UnknownCategory(i64),
    #[error("invalid store_type: {0}")]
    StoreType(String),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

pub fn validate_categories(ids: &[i64]) -> Result<(), ValidationError> {
    if ids.is_empty() {
        return Err(ValidationError::NoCategories);
    }
    match ids.iter().find(|id| !is_valid_category(**id)) {
        Some(bad) => Err(ValidationError::UnknownCategory(*bad)),
        None => Ok(()),
    }
}

pub fn event_id(source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Turn an extraction result into a persistable event.
///
/// Only malformed fields fail; unparseable dates or times degrade to the
/// original text or a sentinel. Coordinates are left as the extractor
/// supplied them; see [`resolve_coordinates`].
pub fn normalize(
    extracted: ExtractedEvent,
    listing: &EventListing,
    today: NaiveDate,
) -> Result<Event, ValidationError> {
    if extracted.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if extracted.location.trim().is_empty() {
        return Err(ValidationError::MissingField("location"));
    }
    validate_categories(&extracted.category_ids)?;
    if let Some(coords) = extracted.coordinates {
        if !coords.is_valid() {
            return Err(ValidationError::InvalidField {
                field: "coordinates",
                reason: format!("{}, {}", coords.latitude, coords.longitude),
            });
        }
    }

    let raw_date = extracted
        .raw_date_text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let range = dates::parse_date_range(raw_date, today);

    let date = match (raw_date, extracted.store_type) {
        (Some(raw), _) => Some(raw.to_string()),
        (None, StoreType::PermanentStore) => Some(dates::ONGOING.to_string()),
        (None, StoreType::Event) => None,
    };

    let time = extracted
        .raw_time_text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let opening_hours = OpeningHours {
        structured: extracted.opening_hours.clone(),
        text: time.clone(),
    };

    let mut images = Vec::new();
    if let Some(image) = listing.image_url.as_deref().filter(|s| !s.trim().is_empty()) {
        images.push(image.to_string());
    }

    let (latitude, longitude) = match extracted.coordinates {
        Some(c) => (Some(c.latitude), Some(c.longitude)),
        None => (None, None),
    };

    Ok(Event {
        id: event_id(&listing.source_url),
        source_url: listing.source_url.clone(),
        name: extracted.name.trim().to_string(),
        description: extracted.description.trim().to_string(),
        location: landmarks::normalize_location(&extracted.location),
        date,
        start_date: range.start,
        end_date: range.end,
        time: time.unwrap_or_else(|| TIME_SENTINEL.to_string()),
        category_ids: extracted.category_ids,
        store_type: extracted.store_type,
        latitude,
        longitude,
        opening_hours,
        images,
        status: EventStatus::Pending,
        created_at_utc: Utc::now().to_rfc3339(),
    })
}

/// Geocode the (landmark-normalized) location. Failures keep whatever the
/// extractor supplied, possibly nothing; they never fail the record.
pub async fn resolve_coordinates(event: &mut Event, geocoder: &dyn Geocoder, retry: &RetryPolicy) {
    let location = landmarks::normalize_location(&event.location);
    let query = location.as_str();
    let resolved = retry
        .run("geocode", move || geocoder.geocode(query))
        .await;

    match resolved {
        Ok(Some(coords)) if coords.is_valid() => {
            debug!(event = %event.id, %location, "coordinates resolved");
            set_coordinates(event, Some(coords));
        }
        Ok(_) => {
            warn!(event = %event.id, %location, "no geocoding result");
        }
        Err(err) => {
            warn!(event = %event.id, %location, error = %err, "geocoding failed");
        }
    }
}

fn set_coordinates(event: &mut Event, coords: Option<Coordinates>) {
    event.latitude = coords.map(|c| c.latitude);
    event.longitude = coords.map(|c| c.longitude);
}
