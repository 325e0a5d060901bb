//! Parsers for the server's textual metadata: `MDTM` replies, unix-style
//! `LIST` lines and autoindex rows from the HTTPS mirror.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::warn;

use super::{ChecksumKind, RemoteFileEntry};
use crate::dates::month_number;

/// Extensions whose names embed the corpus year (`pubmed25n1275.xml.gz`).
const YEAR_BEARING_EXTENSIONS: [&str; 2] = ["gz", "md5"];

static INDEX_HREF_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r#"href="([^"/?#]+)""#));

static INDEX_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?i)<a\s+href="([^"/?#]+)"[^>]*>[^<]*</a>\s+(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\s+([\d.]+[KMGT]?|-)"#,
    )
});

fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Parses an `MDTM` timestamp (`YYYYMMDDHHMMSS`, optionally with a
/// fractional-seconds suffix) as UTC.
#[must_use]
pub fn parse_mdtm_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let whole = value.split('.').next().unwrap_or(value);
    if whole.len() != 14 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Parses one unix-style directory-listing line into a catalog entry.
///
/// Lines look like
/// `-r--r--r--   1 ftp  anonymous  45211651 Sep 14 14:02 pubmed25n1275.xml.gz`.
/// When the date column carries a time of day instead of a year, the year is
/// taken from the corpus file naming for `.gz`/`.md5` names; other names get
/// no date. An unknown month abbreviation also leaves the date absent. Returns
/// `None` only for lines without the nine expected columns.
#[must_use]
pub fn parse_list_line(line: &str) -> Option<RemoteFileEntry> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() < 9 {
        return None;
    }

    let name = columns[8..].join(" ");
    let size = columns[4].parse::<u64>().ok();
    let last_modified = listing_timestamp(columns[5], columns[6], columns[7], &name);

    Some(RemoteFileEntry {
        name,
        size,
        last_modified,
        checksum_kind: ChecksumKind::None,
    })
}

fn listing_timestamp(
    month: &str,
    day: &str,
    year_or_time: &str,
    name: &str,
) -> Option<DateTime<Utc>> {
    let month = month_number(month)?;
    let day = day.parse::<u32>().ok()?;

    let (year, hour, minute) = match year_or_time.split_once(':') {
        Some((hour, minute)) => (
            year_from_archive_name(name)?,
            hour.parse::<u32>().ok()?,
            minute.parse::<u32>().ok()?,
        ),
        None => (year_or_time.parse::<i32>().ok()?, 0, 0),
    };

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Extracts the corpus year from names like `pubmed25n1275.xml.gz` (→ 2025).
fn year_from_archive_name(name: &str) -> Option<i32> {
    let extension = name.rsplit('.').next()?;
    if !YEAR_BEARING_EXTENSIONS.contains(&extension) {
        return None;
    }
    let digits = name.get(6..8)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i32>().ok().map(|short| 2000 + short)
}

/// Extracts linked file names from an autoindex page.
///
/// Directory links (trailing `/`), the parent link and column-sort query
/// links are excluded by the pattern.
#[must_use]
pub fn parse_index_names(html: &str) -> Vec<String> {
    INDEX_HREF_RE
        .captures_iter(html)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extracts name, modification time and approximate size from autoindex rows
/// such as `<a href="x.xml.gz">x.xml.gz</a>   2025-09-14 14:02   45M`.
#[must_use]
pub fn parse_index_rows(html: &str) -> Vec<RemoteFileEntry> {
    INDEX_ROW_RE
        .captures_iter(html)
        .filter_map(|captures| {
            let name = captures.get(1)?.as_str().to_string();
            let stamp = captures.get(2)?.as_str();
            let last_modified = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive));
            if last_modified.is_none() {
                warn!(name = %name, stamp, "unparseable autoindex timestamp");
            }
            let size = captures.get(3).and_then(|m| parse_human_size(m.as_str()));
            Some(RemoteFileEntry {
                name,
                size,
                last_modified,
                checksum_kind: ChecksumKind::None,
            })
        })
        .collect()
}

/// Parses autoindex sizes (`123`, `4.0K`, `45M`) into bytes.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_human_size(text: &str) -> Option<u64> {
    let (number, multiplier) = match text.chars().last()? {
        'K' | 'k' => (&text[..text.len() - 1], 1024_f64),
        'M' | 'm' => (&text[..text.len() - 1], 1024_f64.powi(2)),
        'G' | 'g' => (&text[..text.len() - 1], 1024_f64.powi(3)),
        'T' | 't' => (&text[..text.len() - 1], 1024_f64.powi(4)),
        _ => (text, 1_f64),
    };
    let value = number.parse::<f64>().ok()?;
    (value >= 0.0).then(|| (value * multiplier).round() as u64)
}
