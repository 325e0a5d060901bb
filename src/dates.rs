//! Calendar helpers shared by the catalog, the selector and the transformer.

use chrono::NaiveDate;
use thiserror::Error;

/// Textual date format accepted for date-window bounds (`day/month/year`).
pub const WINDOW_DATE_FORMAT: &str = "%d/%m/%Y";

/// A date-window bound could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date '{value}': expected day/month/year (e.g. 14/09/2025)")]
pub struct InvalidDate {
    /// The rejected input.
    pub value: String,
}

/// Parses a `day/month/year` bound such as `14/09/2025`.
///
/// # Errors
///
/// Returns [`InvalidDate`] when the text is not a valid calendar date in that
/// format.
pub fn parse_day_month_year(value: &str) -> Result<NaiveDate, InvalidDate> {
    NaiveDate::parse_from_str(value.trim(), WINDOW_DATE_FORMAT).map_err(|_| InvalidDate {
        value: value.to_string(),
    })
}

/// Maps an English month abbreviation (`Sep`, `sept`, `DEC`) to its number.
///
/// Only the three-letter forms and the four-letter `sept` are recognized.
#[must_use]
pub fn month_number(abbreviation: &str) -> Option<u32> {
    let month = match abbreviation.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" | "sept" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
