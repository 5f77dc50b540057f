//! Time helpers shared by the store and the Jira projection code.
//!
//! The store keeps every timestamp as Unix seconds.

use chrono::{DateTime, NaiveDate, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Parse a Jira timestamp (`2024-03-01T10:15:30.000+0000`) or an RFC 3339
/// string into Unix seconds.
pub fn parse_jira_timestamp(s: &str) -> Option<i64> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.timestamp())
        .ok()
}

/// Parse a Jira date-only field (`2024-03-01`) into Unix seconds at UTC
/// midnight.
pub fn parse_jira_date(s: &str) -> Option<i64> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Render `since` as a relative JQL date (`-90m`) measured from `now`.
///
/// Absolute JQL dates are read in the API user's profile timezone, while a
/// relative offset is not. Minutes are rounded up and one extra minute
/// covers the delay before Jira evaluates the query, so the bound never
/// lands after `since`.
pub fn jql_since(since: i64, now: i64) -> String {
    let elapsed = (now - since).max(0);
    let minutes = (elapsed + 59) / 60 + 1;
    format!("-{}m", minutes)
}
