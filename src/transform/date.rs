//! Tolerant normalization of the corpus' free-form date text.

use chrono::NaiveDate;

use crate::dates::month_number;

const DEFAULT_MONTH: &str = "01";
const DEFAULT_DAY: &str = "01";

/// Normalizes date text such as `2025`, `2025-Sep`, `2025 Sep 4` or
/// `2025-09-14` to `YYYY-MM-DD` text.
///
/// The input is split on `-` and spaces. A lone year becomes January 1st; a
/// year and month the first of that month; three or more parts use the first
/// three. Month abbreviations (`Sep`, `sept`) and numeric months are accepted;
/// anything else falls back to `01`, as does a non-numeric day. The year is
/// passed through untouched, so the result may still fail to parse as a date.
///
/// Returns `None` for empty input.
#[must_use]
pub fn normalize_date(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw
        .split(['-', ' '])
        .filter(|part| !part.is_empty())
        .collect();

    match parts.as_slice() {
        [] => None,
        [year] => Some(format!("{year}-{DEFAULT_MONTH}-{DEFAULT_DAY}")),
        [year, month] => Some(format!("{year}-{}-{DEFAULT_DAY}", month_digits(month))),
        [year, month, day, ..] => Some(format!(
            "{year}-{}-{}",
            month_digits(month),
            day_digits(day)
        )),
    }
}

fn month_digits(month: &str) -> String {
    if let Ok(number) = month.parse::<u32>() {
        return format!("{number:02}");
    }
    month_number(month).map_or_else(|| DEFAULT_MONTH.to_string(), |number| format!("{number:02}"))
}

fn day_digits(day: &str) -> String {
    match day.parse::<u32>() {
        Ok(number) => format!("{number:02}"),
        Err(_) => DEFAULT_DAY.to_string(),
    }
}

/// Parses a normalized `YYYY-MM-DD` string; anything unparseable is `None`.
#[must_use]
pub fn parse_normalized_date(normalized: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(normalized, "%Y-%m-%d").ok()
}

/// Normalizes and parses in one step.
#[must_use]
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    normalize_date(raw).as_deref().and_then(parse_normalized_date)
}
