//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Take the first `max_chars` characters of `text`
///
/// Returns the excerpt and whether anything was cut off. Counts characters,
/// not bytes, so multi-byte text is never split inside a code point.
pub fn excerpt(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Parse an upstream timestamp into UTC
///
/// Registries disagree on formats: GitHub and npm send RFC 3339 with `Z`,
/// crates.io sends an offset, PyPI's `upload_time` has no zone at all and is
/// UTC by convention.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
