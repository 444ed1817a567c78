//! Publish-date parsing and the trailing-window recency check.
//!
//! News sites print dates in many shapes (`2024-03-12T08:15:00+01:00`,
//! `12.03.2024 08:15`, `12 mars 2024`, `March 12, 2024`). [`parse_date`] tries
//! the structured formats first and then scans the text for the first
//! recognisable date. Everything is normalized to UTC; values without an
//! offset are taken as UTC.

use crate::text::normalize_text;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ISO_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})(?:[t ](\d{1,2}):(\d{2})(?::(\d{2}))?)?")
        .expect("static regex")
});

static DAY_FIRST_NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})[./](\d{1,2})[./](\d{4})(?:[^\d]{1,6}(\d{1,2})[:h](\d{2}))?")
        .expect("static regex")
});

static DAY_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})(?:er|\.)?\s+(?:de\s+)?([a-z]{3,9})\.?\s+(?:de\s+)?(\d{4})")
        .expect("static regex")
});

static MONTH_NAME_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})").expect("static regex")
});

static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[:h](\d{2})\b").expect("static regex"));

/// Month names after [`normalize_text`] (accents stripped, lowercase), for
/// English, French, German, Luxembourgish and Portuguese.
const MONTHS: &[(&str, u32)] = &[
    ("january", 1), ("jan", 1), ("janvier", 1), ("januar", 1), ("janeiro", 1),
    ("february", 2), ("feb", 2), ("fevrier", 2), ("fevr", 2), ("februar", 2), ("fevereiro", 2),
    ("march", 3), ("mar", 3), ("mars", 3), ("marz", 3), ("marco", 3), ("maerz", 3),
    ("april", 4), ("apr", 4), ("avril", 4), ("abril", 4), ("abr", 4), ("abrell", 4),
    ("may", 5), ("mai", 5), ("maio", 5), ("mee", 5),
    ("june", 6), ("jun", 6), ("juin", 6), ("juni", 6), ("junho", 6),
    ("july", 7), ("jul", 7), ("juillet", 7), ("juli", 7), ("julho", 7),
    ("august", 8), ("aug", 8), ("aout", 8), ("agosto", 8),
    ("september", 9), ("sep", 9), ("sept", 9), ("septembre", 9), ("setembro", 9), ("set", 9),
    ("october", 10), ("oct", 10), ("octobre", 10), ("oktober", 10), ("okt", 10), ("outubro", 10), ("out", 10),
    ("november", 11), ("nov", 11), ("novembre", 11), ("novembro", 11),
    ("december", 12), ("dec", 12), ("decembre", 12), ("dezember", 12), ("dez", 12), ("dezembro", 12),
];

fn month_from_name(name: &str) -> Option<u32> {
    MONTHS.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
}

/// Parse a date string found on a page into a UTC timestamp.
///
/// Returns `None` when nothing date-like can be found.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let normalized = normalize_text(trimmed);
    scan_iso_like(&normalized)
        .or_else(|| scan_day_first_numeric(&normalized))
        .or_else(|| scan_day_month_name(&normalized))
        .or_else(|| scan_month_name_day(&normalized))
}

fn scan_iso_like(text: &str) -> Option<DateTime<Utc>> {
    ISO_LIKE.captures_iter(text).find_map(|c| {
        let date = ymd(num(&c, 1)?, num(&c, 2)?, num(&c, 3)?)?;
        let time = hms(num(&c, 4), num(&c, 5), num(&c, 6))?;
        Some(to_utc(date, time))
    })
}

fn scan_day_first_numeric(text: &str) -> Option<DateTime<Utc>> {
    DAY_FIRST_NUMERIC.captures_iter(text).find_map(|c| {
        let date = ymd(num(&c, 3)?, num(&c, 2)?, num(&c, 1)?)?;
        let time = hms(num(&c, 4), num(&c, 5), None)?;
        Some(to_utc(date, time))
    })
}

fn scan_day_month_name(text: &str) -> Option<DateTime<Utc>> {
    DAY_MONTH_NAME.captures_iter(text).find_map(|c| {
        let month = month_from_name(c.get(2)?.as_str())?;
        let date = ymd(num(&c, 3)?, month, num(&c, 1)?)?;
        Some(to_utc(date, trailing_time(text, c.get(0)?.end())))
    })
}

fn scan_month_name_day(text: &str) -> Option<DateTime<Utc>> {
    MONTH_NAME_DAY.captures_iter(text).find_map(|c| {
        let month = month_from_name(c.get(1)?.as_str())?;
        let date = ymd(num(&c, 3)?, month, num(&c, 2)?)?;
        Some(to_utc(date, trailing_time(text, c.get(0)?.end())))
    })
}

/// A clock time printed shortly after a textual date ("12 mars 2024 à 08h15").
fn trailing_time(text: &str, from: usize) -> NaiveTime {
    let tail: String = text[from..].chars().take(12).collect();
    TIME_OF_DAY
        .captures(&tail)
        .and_then(|c| hms(num(&c, 1), num(&c, 2), None))
        .unwrap_or(NaiveTime::MIN)
}

fn num(c: &Captures<'_>, i: usize) -> Option<u32> {
    c.get(i).and_then(|m| m.as_str().parse().ok())
}

fn ymd(year: u32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

fn hms(h: Option<u32>, m: Option<u32>, s: Option<u32>) -> Option<NaiveTime> {
    match (h, m) {
        (Some(h), Some(m)) => NaiveTime::from_hms_opt(h, m, s.unwrap_or(0)),
        _ => Some(NaiveTime::MIN),
    }
}

fn to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&NaiveDateTime::new(date, time))
}

/// True iff `timestamp >= reference - window_days days`.
///
/// The boundary instant itself counts as recent. A window reaching past the
/// representable date range has no cutoff, so everything is recent.
pub fn is_recent(timestamp: DateTime<Utc>, window_days: i64, reference: DateTime<Utc>) -> bool {
    match Duration::try_days(window_days).and_then(|window| reference.checked_sub_signed(window)) {
        Some(cutoff) => timestamp >= cutoff,
        None => true,
    }
}

/// Render a timestamp as an ISO-8601 UTC string (`2024-03-12T07:15:00Z`).
pub fn to_iso_utc(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
