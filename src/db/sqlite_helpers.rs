//! SQLite helper utilities for type conversion
//!
//! SQLite has no array type, so list columns are stored either as JSON text or
//! as comma separated words. Timestamps are stored as RFC 3339 text.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

// ============================================================================
// Array/Vec Helpers
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

/// Split a comma separated word list, dropping blanks
pub fn words_to_vec(s: &str) -> Vec<String> {
    s.split(',')
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Join words back into the comma separated storage form
pub fn vec_to_words(words: &[String]) -> String {
    words.join(",")
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an ISO8601 string to DateTime
#[inline]
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}
