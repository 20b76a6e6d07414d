//! SQLite helper utilities for type conversion
//!
//! SQLite has no native UUID, array or timestamp types. Identifiers are
//! stored as TEXT, ordered lists (genres, languages) as JSON TEXT, and
//! timestamps as fixed-width RFC 3339 TEXT so that lexical order matches
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

// ============================================================================
// UUID Helpers
// ============================================================================

#[inline]
pub fn uuid_to_str(id: Uuid) -> String {
    id.to_string()
}

/// Parse a stored UUID column, reporting failures as decode errors
pub fn decode_uuid(s: &str) -> sqlx::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub fn decode_uuid_opt(s: Option<String>) -> sqlx::Result<Option<Uuid>> {
    s.as_deref().map(decode_uuid).transpose()
}

// ============================================================================
// Array/Vec Helpers (stored as JSON strings in SQLite)
// ============================================================================

/// Serialize a Vec to a JSON string for SQLite storage
#[inline]
pub fn vec_to_json<T: Serialize>(v: &[T]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a JSON string from SQLite to a Vec
#[inline]
pub fn json_to_vec<T: DeserializeOwned>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

// ============================================================================
// Timestamp Helpers (stored as ISO8601 TEXT in SQLite)
// ============================================================================

/// Current UTC timestamp as a fixed-width RFC 3339 string
#[inline]
pub fn now_iso8601() -> String {
    datetime_to_str(Utc::now())
}

#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 string, falling back to SQLite's `datetime()` format
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
}

pub fn decode_datetime(s: &str) -> sqlx::Result<DateTime<Utc>> {
    str_to_datetime(s).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub fn decode_datetime_opt(s: Option<String>) -> sqlx::Result<Option<DateTime<Utc>>> {
    s.as_deref().map(decode_datetime).transpose()
}
