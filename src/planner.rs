use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use crate::geocode::distance_km;
use crate::models::{Coordinates, Event, EventStatus, StoreType};

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub date: NaiveDate,
    /// "HH:MM" start of the visit.
    pub start_time: String,
    pub origin: Option<Coordinates>,
    /// Empty means any category.
    pub categories: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanStop {
    pub event: Event,
    pub distance_km: Option<f64>,
}

/// Approved events a user could visit at the requested date and time,
/// nearest first when an origin is given. Events without coordinates sort
/// last.
pub fn candidates(events: &[Event], request: &PlanRequest) -> Vec<PlanStop> {
    let date = request.date.format("%Y-%m-%d").to_string();

    let mut stops = events
        .iter()
        .filter(|event| event.status == EventStatus::Approved)
        .filter(|event| runs_on(event, request.date))
        .filter(|event| {
            request.categories.is_empty()
                || event
                    .category_ids
                    .iter()
                    .any(|id| request.categories.contains(id))
        })
        .filter(|event| event.is_open_at(&request.start_time, &date))
        .map(|event| PlanStop {
            distance_km: request
                .origin
                .zip(event.coordinates())
                .map(|(origin, at)| distance_km(origin, at)),
            event: event.clone(),
        })
        .collect::<Vec<_>>();

    if request.origin.is_some() {
        stops.sort_by(|a, b| match (a.distance_km, b.distance_km) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }
    stops
}

/// Whether the event's date window covers `date`. Dates that are not ISO
/// (free text, "Ongoing") never exclude an event.
fn runs_on(event: &Event, date: NaiveDate) -> bool {
    let start = event.start_date.as_deref().and_then(iso);
    let end = event.end_date.as_deref().and_then(iso);
    match (start, end) {
        (Some(start), Some(end)) => start <= date && date <= end,
        (Some(start), None) => match event.store_type {
            StoreType::Event => start == date,
            StoreType::PermanentStore => start <= date,
        },
        (None, Some(end)) => date <= end,
        (None, None) => true,
    }
}

fn iso(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
