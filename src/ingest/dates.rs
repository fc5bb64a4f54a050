use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

pub const ONGOING: &str = "Ongoing";

const MIN_YEAR: i32 = 2020;
const MAX_YEAR: i32 = 2030;
const PAST_WINDOW_DAYS: i64 = 30;
const RANGE_SEPARATOR: &str = " - ";

const ONGOING_TOKENS: [&str; 5] = ["now", "ongoing", "now open", "now on", "now showing"];

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("valid year regex"));
static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid ordinal regex"));
static WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)[a-z]*,?\s+")
        .expect("valid weekday regex")
});
static SEPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsept\b").expect("valid sept regex"));

const WITH_YEAR: [&str; 8] = [
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
];

const WITHOUT_YEAR: [&str; 4] = ["%d %B %Y", "%d %b %Y", "%B %d %Y", "%b %d %Y"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Split an extracted date field on `" - "` and format each side.
pub fn parse_date_range(raw: Option<&str>, today: NaiveDate) -> DateRange {
    let raw = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw,
        None => return DateRange::default(),
    };

    match raw.split_once(RANGE_SEPARATOR) {
        Some((start, end)) => DateRange {
            start: non_blank(start).map(|s| format_date(s, today)),
            end: non_blank(end).map(|s| format_date(s, today)),
        },
        None => DateRange {
            start: Some(format_date(raw, today)),
            end: None,
        },
    }
}

/// Format one date to ISO `YYYY-MM-DD`, falling back to the input text.
pub fn format_date(input: &str, today: NaiveDate) -> String {
    let original = input.trim();
    let lowered = original.to_lowercase();
    if ONGOING_TOKENS.contains(&lowered.as_str()) {
        return ONGOING.to_string();
    }

    match parse_date(original, today) {
        Some(date) if (MIN_YEAR..=MAX_YEAR).contains(&date.year()) => {
            date.format("%Y-%m-%d").to_string()
        }
        _ => original.to_string(),
    }
}

pub fn parse_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let cleaned = clean(input);
    if cleaned.is_empty() {
        return None;
    }

    if YEAR_RE.is_match(&cleaned) {
        return WITH_YEAR
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok());
    }

    let year = today.year();
    let with_year = format!("{cleaned} {year}");
    let date = WITHOUT_YEAR
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())?;

    if date < today - Duration::days(PAST_WINDOW_DAYS) {
        date.with_year(year + 1)
    } else {
        Some(date)
    }
}

fn clean(input: &str) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_weekday = WEEKDAY_RE.replace(&collapsed, "");
    let without_ordinals = ORDINAL_RE.replace_all(&without_weekday, "$1");
    SEPT_RE.replace_all(&without_ordinals, "Sep").trim().to_string()
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
    }

    #[test]
    fn splits_ranges_on_spaced_dash() {
        let range = parse_date_range(Some("22 May 2025 - 28 Sep 2025"), day(2025, 6, 1));
        assert_eq!(range.start.as_deref(), Some("2025-05-22"));
        assert_eq!(range.end.as_deref(), Some("2025-09-28"));
    }

    #[test]
    fn single_date_fills_start_only() {
        let range = parse_date_range(Some("May 22, 2025"), day(2025, 6, 1));
        assert_eq!(range.start.as_deref(), Some("2025-05-22"));
        assert_eq!(range.end, None);
    }

    #[test]
    fn missing_date_is_empty() {
        assert!(parse_date_range(None, day(2025, 6, 1)).is_empty());
        assert!(parse_date_range(Some("  "), day(2025, 6, 1)).is_empty());
    }

    #[test]
    fn relative_phrases_are_kept_verbatim() {
        let range = parse_date_range(Some("Every Friday"), day(2025, 6, 1));
        assert_eq!(range.start.as_deref(), Some("Every Friday"));
    }

    #[test]
    fn ongoing_tokens() {
        assert_eq!(format_date("Now", day(2025, 6, 1)), ONGOING);
        assert_eq!(format_date("ongoing", day(2025, 6, 1)), ONGOING);
        assert_eq!(format_date("Now Open", day(2025, 6, 1)), ONGOING);
        let range = parse_date_range(Some("Now - 30 Jun 2025"), day(2025, 6, 1));
        assert_eq!(range.start.as_deref(), Some(ONGOING));
        assert_eq!(range.end.as_deref(), Some("2025-06-30"));
    }

    #[test]
    fn bare_day_month_uses_current_year_when_recent() {
        assert_eq!(format_date("22 May", day(2025, 6, 1)), "2025-05-22");
    }

    #[test]
    fn bare_day_month_rolls_forward_when_long_past() {
        assert_eq!(format_date("22 May", day(2026, 1, 1)), "2026-05-22");
        assert_eq!(format_date("3 Jan", day(2025, 12, 1)), "2026-01-03");
        assert_eq!(format_date("15 Oct", day(2025, 12, 1)), "2026-10-15");
        assert_eq!(format_date("3 Nov", day(2025, 12, 1)), "2025-11-03");
    }

    #[test]
    fn tolerates_weekdays_ordinals_and_sept() {
        assert_eq!(format_date("Fri, 22nd May 2025", day(2025, 6, 1)), "2025-05-22");
        assert_eq!(format_date("28 Sept 2025", day(2025, 6, 1)), "2025-09-28");
        assert_eq!(format_date("2025-07-04", day(2025, 6, 1)), "2025-07-04");
        assert_eq!(format_date("04/07/2025", day(2025, 6, 1)), "2025-07-04");
    }

    #[test]
    fn out_of_range_years_keep_original_text() {
        assert_eq!(format_date("22 May 2019", day(2025, 6, 1)), "22 May 2019");
        assert_eq!(format_date("1 Jan 2031", day(2025, 6, 1)), "1 Jan 2031");
    }

    #[test]
    fn garbage_is_returned_unchanged() {
        assert_eq!(format_date("  TBC  ", day(2025, 6, 1)), "TBC");
        assert_eq!(format_date("31 Feb 2025", day(2025, 6, 1)), "31 Feb 2025");
    }
}
