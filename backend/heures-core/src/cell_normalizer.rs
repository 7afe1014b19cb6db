// src/cell_normalizer.rs
//
// Turns raw spreadsheet cells into canonical dates, clock times and hour
// durations. Every function here is total: bad input degrades to an empty
// value, zero, or the raw text, never to an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::*;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::sheet::CellValue;

/// Days between 1899-12-30 (spreadsheet day zero) and 1970-01-01.
pub const SERIAL_EPOCH_OFFSET_DAYS: f64 = 25569.0;
const SECONDS_PER_DAY: f64 = 86400.0;
/// Above this a "duration" is a timestamp that was misread.
pub const CORRUPT_DURATION_THRESHOLD: f64 = 1_000_000.0;
/// Largest serial the calendar conversion accepts (9999-12-31).
const MAX_SERIAL_DAY: f64 = 2_958_465.0;
const HOURS_SCALE: u32 = 4;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid iso date pattern"));
static DAY_FIRST_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").expect("valid day-first date pattern")
});
static CLOCK_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+):(\d+)(?::(\d+))?\s*$").expect("valid clock duration pattern")
});
static CLOCK_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2}):(\d{1,2})").expect("valid clock time pattern"));
static LEADING_DECIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)").expect("valid leading decimal pattern")
});
static TRAILING_ZONE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("valid zone name pattern"));

const GENERIC_DATE_FORMATS: [&str; 6] = [
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%Y.%m.%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%d %b %Y",
];

const GENERIC_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
];

// --- Output types ---

/// Which canonical value a cell should be turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Date,
    Time,
    Duration,
}

/// A normalized date. Unparseable text is kept verbatim so it can still be
/// shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedDate {
    Iso(NaiveDate),
    Raw(String),
}

impl NormalizedDate {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            NormalizedDate::Iso(date) => Some(*date),
            NormalizedDate::Raw(_) => None,
        }
    }
}

impl fmt::Display for NormalizedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedDate::Iso(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            NormalizedDate::Raw(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for NormalizedDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedCell {
    Date(Option<NormalizedDate>),
    Time(String),
    Duration(Decimal),
}

/// Normalized timing fields of one course row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTiming {
    pub date: Option<NormalizedDate>,
    pub start_time: String,
    pub end_time: String,
    pub duration: Decimal,
}

// --- Entry points ---

pub fn normalize_cell(raw: &CellValue, kind: TargetKind) -> NormalizedCell {
    match kind {
        TargetKind::Date => NormalizedCell::Date(normalize_date(raw)),
        TargetKind::Time => NormalizedCell::Time(normalize_time(raw)),
        TargetKind::Duration => NormalizedCell::Duration(normalize_duration(raw)),
    }
}

/// Normalizes the date, start, end and duration cells of a course row,
/// deriving the duration from the clock times when none was given.
pub fn normalize_timing(
    date: Option<&CellValue>,
    start: Option<&CellValue>,
    end: Option<&CellValue>,
    duration: Option<&CellValue>,
) -> SessionTiming {
    let start_time = start.map(normalize_time).unwrap_or_default();
    let end_time = end.map(normalize_time).unwrap_or_default();
    let raw_duration = duration.map(normalize_duration).unwrap_or(Decimal::ZERO);
    SessionTiming {
        date: date.and_then(normalize_date),
        duration: resolve_duration(raw_duration, &start_time, &end_time),
        start_time,
        end_time,
    }
}

// --- Dates ---

pub fn normalize_date(raw: &CellValue) -> Option<NormalizedDate> {
    match raw {
        CellValue::Empty => None,
        CellValue::DateTime(dt) => Some(NormalizedDate::Iso(dt.date())),
        CellValue::Number(n) => Some(
            serial_to_datetime(*n)
                .map(|dt| NormalizedDate::Iso(dt.date()))
                .unwrap_or_else(|| NormalizedDate::Raw(CellValue::Number(*n).as_trimmed_string())),
        ),
        CellValue::Text(text) => normalize_date_text(text),
    }
}

fn normalize_date_text(text: &str) -> Option<NormalizedDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if ISO_DATE.is_match(trimmed) {
        return Some(
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(NormalizedDate::Iso)
                .unwrap_or_else(|_| NormalizedDate::Raw(trimmed.to_string())),
        );
    }

    if let Some(caps) = DAY_FIRST_DATE.captures(trimmed) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = caps[3].parse().unwrap_or(0);
        return Some(match NaiveDate::from_ymd_opt(year, month, day) {
            Some(date) => NormalizedDate::Iso(date),
            None => NormalizedDate::Raw(format!("{:04}-{:02}-{:02}", year, month, day)),
        });
    }

    if let Some(date) = parse_generic_date(trimmed) {
        return Some(NormalizedDate::Iso(date));
    }

    Some(NormalizedDate::Raw(text.to_string()))
}

fn parse_generic_date(text: &str) -> Option<NaiveDate> {
    if let Some(dt) = parse_timestamp(text) {
        return Some(dt.date());
    }
    GENERIC_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            GENERIC_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Parses full timestamps: RFC 3339, RFC 2822 and the browser
/// `Date::toString` form (`Fri Mar 15 2024 08:00:00 GMT+0300 (EAT)`).
/// Wall-clock fields are kept as written, without zone conversion.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.naive_local());
    }
    if trimmed.contains("GMT") {
        let without_zone_name = TRAILING_ZONE_NAME.replace(trimmed, "");
        if let Ok(dt) =
            DateTime::parse_from_str(&without_zone_name, "%a %b %d %Y %H:%M:%S GMT%z")
        {
            return Some(dt.naive_local());
        }
        let without_offset = without_zone_name
            .split(" GMT")
            .next()
            .unwrap_or_default()
            .to_string();
        if let Ok(dt) = NaiveDateTime::parse_from_str(&without_offset, "%a %b %d %Y %H:%M:%S") {
            return Some(dt);
        }
    }
    None
}

/// Spreadsheet serial (days since 1899-12-30, fraction = time of day).
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_SERIAL_DAY {
        return None;
    }
    let seconds = ((serial - SERIAL_EPOCH_OFFSET_DAYS) * SECONDS_PER_DAY).round() as i64;
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.naive_utc())
}

// --- Clock times ---

pub fn normalize_time(raw: &CellValue) -> String {
    match raw {
        CellValue::Empty => String::new(),
        CellValue::DateTime(dt) => format_clock(dt),
        CellValue::Number(n) => serial_to_datetime(*n)
            .map(|dt| format_clock(&dt))
            .unwrap_or_default(),
        CellValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return String::new();
            }
            if let Some(dt) = parse_timestamp(trimmed) {
                return format_clock(&dt);
            }
            if trimmed.contains(':') {
                return trimmed.to_string();
            }
            String::new()
        }
    }
}

fn format_clock(dt: &NaiveDateTime) -> String {
    format!("{:02}:{:02}:00", dt.hour(), dt.minute())
}

/// Decimal hours of an `HH:MM[:SS]` clock time; seconds are ignored.
/// Out-of-range fields such as `25:99` give `None`.
pub fn clock_hours(time: &str) -> Option<Decimal> {
    let caps = CLOCK_TIME.captures(time)?;
    let hours: u32 = caps[1].parse().ok()?;
    let minutes: u32 = caps[2].parse().ok()?;
    let clock = NaiveTime::from_hms_opt(hours, minutes, 0)?;
    Some(hours_and_minutes(clock.hour(), clock.minute()))
}

fn hours_and_minutes(hours: u32, minutes: u32) -> Decimal {
    (Decimal::from(hours) + Decimal::from(minutes) / Decimal::from(60u32)).round_dp(HOURS_SCALE)
}

// --- Durations ---

pub fn normalize_duration(raw: &CellValue) -> Decimal {
    match raw {
        CellValue::Empty => Decimal::ZERO,
        CellValue::Number(n) => {
            if !n.is_finite() || *n > CORRUPT_DURATION_THRESHOLD || *n <= 0.0 {
                return Decimal::ZERO;
            }
            Decimal::from_f64(*n)
                .map(|d| d.round_dp(HOURS_SCALE).normalize())
                .unwrap_or(Decimal::ZERO)
        }
        CellValue::DateTime(dt) => hours_and_minutes(dt.hour(), dt.minute()),
        CellValue::Text(text) => discard_corrupt(parse_duration_text(text)),
    }
}

fn discard_corrupt(hours: Decimal) -> Decimal {
    if hours > Decimal::from_f64(CORRUPT_DURATION_THRESHOLD).unwrap_or(Decimal::MAX) {
        return Decimal::ZERO;
    }
    hours
}

fn parse_duration_text(text: &str) -> Decimal {
    let trimmed = text.trim();
    if let Some(caps) = CLOCK_DURATION.captures(trimmed) {
        let hours: u32 = caps[1].parse().unwrap_or(0);
        let minutes: u32 = caps[2].parse().unwrap_or(0);
        return hours_and_minutes(hours, minutes);
    }
    let dotted = trimmed.replace(',', ".");
    LEADING_DECIMAL
        .find(&dotted)
        .and_then(|m| {
            let number = m.as_str();
            let number = number.strip_prefix('+').unwrap_or(number);
            Decimal::from_str(number)
                .or_else(|_| Decimal::from_str(&format!("0{}", number)))
                .ok()
        })
        .map(|d| d.max(Decimal::ZERO).normalize())
        .unwrap_or(Decimal::ZERO)
}

/// Span between two clock times, never negative.
pub fn derive_duration(start_time: &str, end_time: &str) -> Option<Decimal> {
    let start = clock_hours(start_time)?;
    let end = clock_hours(end_time)?;
    Some((end - start).max(Decimal::ZERO))
}

/// Keeps a non-zero duration, otherwise falls back to the clock span.
pub fn resolve_duration(duration: Decimal, start_time: &str, end_time: &str) -> Decimal {
    if duration > Decimal::ZERO {
        return duration;
    }
    if start_time.is_empty() || end_time.is_empty() {
        return Decimal::ZERO;
    }
    derive_duration(start_time, end_time).unwrap_or(Decimal::ZERO)
}
