//! Normalization of the human-readable dates found on listing pages.
//!
//! Sources print dates as `14:05`, `Сегодня, 10:30`, `20 февраля, 08:40`,
//! `20 февраля 2025, 08:40`, `10.05.2025` or ISO timestamps. Everything is
//! reduced to a calendar date relative to an injected reference time, so the
//! result is deterministic for a given `(raw, reference)` pair.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use regex::Regex;

static TIME_ONLY: OnceLock<Regex> = OnceLock::new();
static FOUR_DIGIT_YEAR: OnceLock<Regex> = OnceLock::new();

const TODAY_TOKENS: &[&str] = &["сегодня", "today"];
const YESTERDAY_TOKENS: &[&str] = &["вчера", "yesterday"];

/// Three-letter month prefixes, Russian (any case form) and English.
const MONTHS: &[(&str, u32)] = &[
    ("янв", 1),
    ("фев", 2),
    ("мар", 3),
    ("апр", 4),
    ("мая", 5),
    ("май", 5),
    ("июн", 6),
    ("июл", 7),
    ("авг", 8),
    ("сен", 9),
    ("окт", 10),
    ("ноя", 11),
    ("дек", 12),
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

fn time_only() -> &'static Regex {
    TIME_ONLY.get_or_init(|| Regex::new(r"^\d{1,2}:\d{2}$").expect("valid time regex"))
}

fn four_digit_year() -> &'static Regex {
    FOUR_DIGIT_YEAR.get_or_init(|| Regex::new(r"\d{4}").expect("valid year regex"))
}

/// Converts `raw` to a calendar date. Never fails: unrecognized input
/// resolves to the reference date.
pub fn normalize(raw: &str, reference: NaiveDateTime) -> NaiveDate {
    let today = reference.date();
    let text = raw.trim();

    if text.is_empty() || time_only().is_match(text) {
        return today;
    }

    let lower = text.to_lowercase();
    if TODAY_TOKENS.iter().any(|t| lower.contains(t)) {
        return today;
    }
    if YESTERDAY_TOKENS.iter().any(|t| lower.contains(t)) {
        return today - Duration::days(1);
    }

    let candidate = if four_digit_year().is_match(&lower) {
        lower
    } else {
        let day_month = lower.split(',').next().unwrap_or_default().trim();
        format!("{} {}", day_month, today.year())
    };

    match parse_absolute(&candidate) {
        Some(date) => date,
        None => {
            tracing::debug!(raw, "Unrecognized date, using reference date");
            today
        }
    }
}

fn month_from_name(token: &str) -> Option<u32> {
    let prefix: String = token.chars().take(3).collect();
    MONTHS
        .iter()
        .find(|(name, _)| *name == prefix)
        .map(|(_, month)| *month)
}

/// Day-month-year parse of a lowercased string that contains a year.
fn parse_absolute(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Some(prefix) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }

    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '/' | '-'))
        .filter(|t| !t.is_empty() && !t.contains(':'))
        .collect();

    let mut year = None;
    let mut month = None;
    let mut numbers = Vec::new();

    for token in &tokens {
        if token.chars().all(|c| c.is_ascii_digit()) {
            if token.len() == 4 && year.is_none() {
                year = token.parse::<i32>().ok();
            } else if token.len() <= 2 {
                numbers.push(token.parse::<u32>().ok()?);
            }
        } else if month.is_none() {
            month = month_from_name(token);
        }
    }

    let year = year?;
    let (day, month) = match (month, numbers.as_slice()) {
        (Some(month), [day, ..]) => (*day, month),
        (None, [day, month, ..]) => (*day, *month),
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, month, day)
}
