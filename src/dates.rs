use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

// Two-digit years go first so "3/5/24" is not read as year 24.
const DATE_FORMATS: [&str; 7] = [
    "%m/%d/%y",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d-%b-%Y",
];

const BLANK_TOKENS: [&str; 4] = ["", "nan", "none", "nat"];

fn us_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("static date pattern is valid")
    })
}

/// Parse a date-of-service style value. Blank and unparsable input yields `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if BLANK_TOKENS.contains(&value.to_lowercase().as_str()) {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        })
}

/// Render a value as `mm/dd/yyyy`, or an empty string when it is not a date.
///
/// Values already written as `m/d/yyyy` are only zero-padded.
pub fn format_us_date(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(caps) = us_date_pattern().captures(trimmed) {
        let month: u32 = caps[1].parse().unwrap_or(0);
        let day: u32 = caps[2].parse().unwrap_or(0);
        return format!("{:02}/{:02}/{}", month, day, &caps[3]);
    }
    parse_date(trimmed)
        .map(|date| date.format("%m/%d/%Y").to_string())
        .unwrap_or_default()
}
