use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) static RELATIVE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(days?|weeks?|months?|years?)\s+ago\b").expect("valid relative date pattern")
});

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid iso date pattern"));

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2}\s+[A-Za-z]+\.?\s+\d{4})\b").expect("valid day-month-year pattern")
});

static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z]+\.?\s+\d{1,2},\s*\d{4})\b").expect("valid month-day-year pattern")
});

static SLASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{4})\b").expect("valid slashed date pattern"));

static DASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}-\d{1,2}-\d{4})\b").expect("valid dashed date pattern"));

/// Length of one unit in a "`<n> <unit> ago`" expression, in days.
pub fn unit_days(unit: &str) -> Option<i64> {
    let unit = unit.to_ascii_lowercase();
    if unit.starts_with("day") {
        Some(1)
    } else if unit.starts_with("week") {
        Some(7)
    } else if unit.starts_with("month") {
        Some(30)
    } else if unit.starts_with("year") {
        Some(365)
    } else {
        None
    }
}

/// Resolve "`<n> <unit> ago`" against `now`. Months are 30 days and years 365.
pub fn parse_relative(raw: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let captures = RELATIVE_DATE.captures(raw)?;
    let amount = captures.get(1)?.as_str().parse::<i64>().ok()?;
    let days = amount.checked_mul(unit_days(captures.get(2)?.as_str())?)?;
    let offset = Duration::try_days(days)?;
    now.checked_sub_signed(offset).map(|instant| instant.date_naive())
}

static SEPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsept\b").expect("valid sept pattern"));

/// First match of `pattern` in `s` that parses with one of `formats`.
/// Abbreviation dots are dropped and "Sept" is read as "Sep".
fn first_parsed(pattern: &Regex, s: &str, formats: &[&str]) -> Option<NaiveDate> {
    pattern
        .captures_iter(s)
        .filter_map(|c| c.get(1))
        .find_map(|m| {
            let text = m.as_str().replace('.', "");
            let text = SEPT.replace_all(&text, "Sep");
            formats
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
        })
}

/// Parse an absolute date written in one of the forms review pages use,
/// possibly embedded in longer text such as "Reviewed in India on 5 August 2025".
pub fn parse_absolute(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    first_parsed(&ISO_DATE, s, &["%Y-%m-%d"])
        .or_else(|| first_parsed(&DAY_MONTH_YEAR, s, &["%d %B %Y", "%d %b %Y"]))
        .or_else(|| first_parsed(&MONTH_DAY_YEAR, s, &["%B %d, %Y", "%b %d, %Y", "%B %d,%Y", "%b %d,%Y"]))
        .or_else(|| first_parsed(&SLASHED, s, &["%m/%d/%Y"]))
        .or_else(|| first_parsed(&DASHED, s, &["%m-%d-%Y"]))
}

/// Normalize a raw date expression to a calendar day. Relative expressions
/// win over absolute ones when both appear.
pub fn normalize_date(raw: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    if raw.trim().is_empty() {
        return None;
    }
    parse_relative(raw, now).or_else(|| parse_absolute(raw))
}
