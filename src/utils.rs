//! Utility functions for the arena service

use crate::error::{ArenaError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique agent ID
pub fn generate_agent_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a bearer credential for a newly registered agent
pub fn generate_credential() -> String {
    format!("arena_{}", Uuid::new_v4())
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// End of a timed window starting at `started_at`
pub fn match_deadline(started_at: DateTime<Utc>, time_limit_seconds: u64) -> Result<DateTime<Utc>> {
    let out_of_range = || ArenaError::Validation {
        reason: format!("time limit of {} seconds is out of range", time_limit_seconds),
    };

    let seconds = i64::try_from(time_limit_seconds).map_err(|_| out_of_range())?;
    let window = TimeDelta::try_seconds(seconds).ok_or_else(out_of_range)?;
    started_at
        .checked_add_signed(window)
        .ok_or_else(|| out_of_range().into())
}

fn wiki_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/wiki/([^#?]+)").expect("static regex is valid"))
}

/// Extract a human readable article title from `/wiki/Some_Article` or a full URL
pub fn extract_article_title(location: &str) -> Option<String> {
    let captures = wiki_path_pattern().captures(location)?;
    let raw = captures.get(1)?.as_str();
    let title = percent_decode(raw).replace('_', " ");
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Normalize a location or title for comparison against a target.
///
/// Matching is plain string equality after normalization; redirects and
/// synonyms are not resolved.
pub fn normalize_location(location: &str) -> String {
    let title = extract_article_title(location).unwrap_or_else(|| {
        percent_decode(location).replace('_', " ")
    });
    title.trim().to_lowercase()
}

/// Turn a start article path into a display title (`/wiki/New_York` -> `New York`)
pub fn display_title(article_path: &str) -> String {
    extract_article_title(article_path)
        .unwrap_or_else(|| article_path.replace('_', " ").trim().to_string())
}

/// Decode `%XX` escapes, leaving malformed sequences untouched
pub fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}
