use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Pending,
    Approved,
    Rejected,
    Processed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} transition: {from} -> {to}")]
pub struct TransitionError {
    pub kind: &'static str,
    pub from: String,
    pub to: String,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Pending => "pending",
            ListingStatus::Approved => "approved",
            ListingStatus::Rejected => "rejected",
            ListingStatus::Processed => "processed",
            ListingStatus::Error => "error",
        }
    }

    pub fn can_transition_to(&self, next: ListingStatus) -> bool {
        use ListingStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Processed)
                | (Approved, Error)
                | (Error, Approved)
        )
    }

    pub fn transition(self, next: ListingStatus) -> Result<ListingStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                kind: "listing",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ListingStatus::Pending),
            "approved" => Ok(ListingStatus::Approved),
            "rejected" => Ok(ListingStatus::Rejected),
            "processed" => Ok(ListingStatus::Processed),
            "error" => Ok(ListingStatus::Error),
            other => Err(format!("unknown listing status: {other}")),
        }
    }
}

/// A scraped title/url/image triple waiting for moderation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventListing {
    pub title: String,
    pub source_url: String,
    pub image_url: Option<String>,
    pub status: ListingStatus,
    pub error_message: Option<String>,
    pub created_at_utc: String,
    pub updated_at_utc: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    Event,
    PermanentStore,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Event => "event",
            StoreType::PermanentStore => "permanent_store",
        }
    }

    /// Only the two literal values are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "event" => Some(StoreType::Event),
            "permanent_store" => Some(StoreType::PermanentStore),
            _ => None,
        }
    }
}

pub const MIN_CATEGORY_ID: i64 = 1;
pub const MAX_CATEGORY_ID: i64 = 20;

const CATEGORY_NAMES: [&str; 20] = [
    "Music",
    "Arts & Culture",
    "Food & Drink",
    "Nightlife",
    "Sports & Fitness",
    "Family & Kids",
    "Festivals",
    "Markets & Shopping",
    "Exhibitions",
    "Theatre & Performance",
    "Film",
    "Workshops & Classes",
    "Outdoors & Nature",
    "Wellness",
    "Tech & Business",
    "Community",
    "Heritage & Tours",
    "Comedy",
    "Attractions",
    "Cafes & Dining",
];

pub fn category_name(id: i64) -> Option<&'static str> {
    if (MIN_CATEGORY_ID..=MAX_CATEGORY_ID).contains(&id) {
        CATEGORY_NAMES.get((id - 1) as usize).copied()
    } else {
        None
    }
}

pub fn is_valid_category(id: i64) -> bool {
    category_name(id).is_some()
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DayHours {
    pub day: String,
    pub open: Option<String>,
    pub close: Option<String>,
    #[serde(default)]
    pub closed: bool,
}

/// Opening hours in either (or both) of the shapes the extractor produces.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OpeningHours {
    #[serde(default)]
    pub structured: Vec<DayHours>,
    pub text: Option<String>,
}

/// Fields returned by the extraction collaborator, already shape-checked.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExtractedEvent {
    pub name: String,
    pub raw_date_text: Option<String>,
    pub raw_time_text: Option<String>,
    pub location: String,
    pub description: String,
    pub category_ids: Vec<i64>,
    pub store_type: StoreType,
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub opening_hours: Vec<DayHours>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Approved,
    Expired,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Expired => "expired",
        }
    }

    pub fn transition(self, next: EventStatus) -> Result<EventStatus, TransitionError> {
        use EventStatus::*;
        if matches!(
            (self, next),
            (Pending, Approved) | (Pending, Expired) | (Approved, Expired)
        ) {
            Ok(next)
        } else {
            Err(TransitionError {
                kind: "event",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(EventStatus::Pending),
            "approved" => Ok(EventStatus::Approved),
            "expired" => Ok(EventStatus::Expired),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: String, // sha256 of source_url
    pub source_url: String,
    pub name: String,
    pub description: String,
    pub location: String,
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub time: String,
    pub category_ids: Vec<i64>,
    pub store_type: StoreType,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub opening_hours: OpeningHours,
    pub images: Vec<String>,
    pub status: EventStatus,
    pub created_at_utc: String,
}

impl Event {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// See [`crate::hours::is_open_at`].
    pub fn is_open_at(&self, start_time: &str, date: &str) -> bool {
        crate::hours::is_open_at(&self.opening_hours, start_time, date)
    }
}
