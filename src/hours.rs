//! Opening-hours availability matching.
//!
//! Every ambiguous input resolves towards "open": a venue missing from a
//! plan is worse than one that turns out to be shut.

use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{DayHours, OpeningHours};

/// Placeholder written by the classifier when no time was extracted.
pub const TIME_SENTINEL: &str = "Check website for opening hours";

const DEFAULT_OPEN: u32 = 6 * 60;
const DEFAULT_CLOSE: u32 = 23 * 60;
const MINUTES_PER_DAY: u32 = 24 * 60;
// A listed close of exactly midnight usually means "till late".
const MIDNIGHT_GRACE: u32 = 60;

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2})(?:[:.](\d{2}))?\s*(am|pm)?\s*(?:-|–|—|\bto\b)\s*(\d{1,2})(?:[:.](\d{2}))?\s*(am|pm)?",
    )
    .expect("valid hours range regex")
});

static CLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,2})(?:[:.](\d{2}))?\s*(am|pm)?\s*$").expect("valid clock regex")
});

/// Decide whether a venue is open at `start_time` ("HH:MM") on `date` (ISO).
pub fn is_open_at(hours: &OpeningHours, start_time: &str, date: &str) -> bool {
    if !has_data(hours) {
        return true;
    }
    let minute = match parse_clock(start_time) {
        Some(m) => m,
        None => return true,
    };
    let weekday = match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(d) => d.weekday(),
        Err(_) => return true,
    };
    is_open_on(hours, weekday, minute)
}

pub fn is_open_on(hours: &OpeningHours, weekday: Weekday, minute: u32) -> bool {
    if !has_data(hours) {
        return true;
    }

    if let Some(entry) = hours
        .structured
        .iter()
        .find(|entry| day_matches(&entry.day, weekday))
    {
        return structured_open(entry, minute);
    }

    match free_text(hours) {
        Some(text) => text_open(text, minute),
        None => true,
    }
}

fn has_data(hours: &OpeningHours) -> bool {
    !hours.structured.is_empty() || free_text(hours).is_some()
}

fn free_text(hours: &OpeningHours) -> Option<&str> {
    hours
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != TIME_SENTINEL)
}

fn structured_open(entry: &DayHours, minute: u32) -> bool {
    if entry.closed {
        return false;
    }
    let open = entry.open.as_deref().and_then(parse_clock);
    let close = entry.close.as_deref().and_then(parse_clock);
    match (open, close) {
        (Some(open), Some(close)) => within(open, close, minute),
        _ => true,
    }
}

/// Match free-text hours such as "10am - 10pm" or "11:00-14:30; 17:30-22:00".
pub fn text_open(text: &str, minute: u32) -> bool {
    let lower = text.to_lowercase();
    if lower.contains("24/7") || lower.contains("24 hours") {
        return true;
    }
    if lower.contains("closed") {
        return false;
    }

    let ranges = parse_ranges(&lower);
    if ranges.is_empty() {
        return within(DEFAULT_OPEN, DEFAULT_CLOSE, minute);
    }
    ranges
        .iter()
        .any(|(open, close)| within(*open, *close, minute))
}

/// Every time range found in `text`, as minute-of-day pairs.
pub fn parse_ranges(text: &str) -> Vec<(u32, u32)> {
    let lower = text.to_lowercase();
    let mut out = Vec::new();
    for segment in lower.split([',', ';']) {
        for caps in RANGE_RE.captures_iter(segment) {
            let start_hour = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            let start_min = caps
                .get(2)
                .map(|m| m.as_str().parse::<u32>().unwrap_or(0))
                .unwrap_or(0);
            let end_hour = caps.get(4).and_then(|m| m.as_str().parse::<u32>().ok());
            let end_min = caps
                .get(5)
                .map(|m| m.as_str().parse::<u32>().unwrap_or(0))
                .unwrap_or(0);
            let end_period = caps.get(6).map(|m| m.as_str());
            let mut start_period = caps.get(3).map(|m| m.as_str());

            let (start_hour, end_hour) = match (start_hour, end_hour) {
                (Some(s), Some(e)) => (s, e),
                _ => continue,
            };
            // Bare digit pairs ("1-3 Jan", "Level 2-3") are not clock times.
            let has_clock_marker = [2, 3, 5, 6].iter().any(|&group| caps.get(group).is_some());
            if !has_clock_marker {
                continue;
            }

            // "6-10pm" reads as 18:00-22:00, "11-9pm" stays 11:00-21:00
            if start_period.is_none() && end_period == Some("pm") && start_hour < 12 {
                let end_24 = to_minutes(end_hour, end_min, end_period);
                let inherited = to_minutes(start_hour, start_min, Some("pm"));
                if let (Some(end_24), Some(inherited)) = (end_24, inherited) {
                    if inherited <= end_24 {
                        start_period = Some("pm");
                    }
                }
            }

            let open = to_minutes(start_hour, start_min, start_period);
            let close = to_minutes(end_hour, end_min, end_period);
            if let (Some(open), Some(close)) = (open, close) {
                out.push((open, close));
            }
        }
    }
    out
}

/// Parse "HH:MM", "H:MMam", "7pm" and friends into minutes since midnight.
pub fn parse_clock(value: &str) -> Option<u32> {
    let caps = CLOCK_RE.captures(value)?;
    let hour = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let minute = caps
        .get(2)
        .map(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(Some(0))?;
    let period = caps.get(3).map(|m| m.as_str().to_lowercase());
    to_minutes(hour, minute, period.as_deref())
}

fn to_minutes(hour: u32, minute: u32, period: Option<&str>) -> Option<u32> {
    if minute >= 60 {
        return None;
    }
    let hour = match period {
        Some(p) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            match (p, hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                ("pm", 12) => 12,
                (_, h) => h + 12,
            }
        }
        None => hour,
    };
    let total = hour * 60 + minute;
    if total > MINUTES_PER_DAY {
        return None;
    }
    Some(total)
}

/// Inclusive interval test; `close < open` wraps past midnight and
/// `open == close` ("00:00-00:00") is the whole day.
fn within(open: u32, close: u32, minute: u32) -> bool {
    if open == close {
        return true;
    }
    if close < open {
        let close = if close == 0 { MIDNIGHT_GRACE } else { close };
        minute >= open || minute <= close
    } else {
        open <= minute && minute <= close
    }
}

fn day_matches(label: &str, weekday: Weekday) -> bool {
    let label = label.trim().to_lowercase();
    if label.len() < 3 {
        return false;
    }
    let full = weekday_name(weekday);
    full == label || (label.len() <= full.len() && full.starts_with(&label))
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}
