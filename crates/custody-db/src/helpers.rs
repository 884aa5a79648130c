//! Row-to-entity parsing helpers.
//!
//! Every repo converts `libsql::Row` (column-indexed) into typed entity
//! structs. Timestamps are written in one fixed-width format so that SQL
//! string comparison orders them chronologically.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::error::AuditError;

/// Format a timestamp for storage: RFC 3339, microseconds, `Z` suffix.
#[must_use]
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Truncate a timestamp to the precision that survives a storage roundtrip.
#[must_use]
pub fn storage_precision(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(6)
}

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// # Errors
///
/// Returns `AuditError::Query` if the string is not RFC 3339.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AuditError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AuditError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Parse an optional TEXT column as `Option<DateTime<Utc>>`.
///
/// # Errors
///
/// Returns `AuditError::Query` if a non-empty string cannot be parsed.
pub fn parse_optional_datetime(s: Option<&str>) -> Result<Option<DateTime<Utc>>, AuditError> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(parse_datetime(s)?)),
        _ => Ok(None),
    }
}

/// Parse a TEXT column into a serde-deserializable enum.
///
/// Works with all custody-core enums that use `#[serde(rename_all = "snake_case")]`.
///
/// # Errors
///
/// Returns `AuditError::Query` if the string does not match any enum variant.
pub fn parse_enum<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, AuditError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| AuditError::Query(format!("Failed to parse enum from '{s}': {e}")))
}

/// Read a nullable TEXT column.
///
/// `row.get::<String>(idx)` on a NULL column returns an error, not `""`.
/// You must use `get::<Option<String>>()` for nullable columns. Unlike
/// free-text columns elsewhere, an empty string stays `Some("")` here:
/// hashed fields must roundtrip exactly.
///
/// # Errors
///
/// Returns `AuditError` if the column read fails.
pub fn get_opt_string(row: &libsql::Row, idx: i32) -> Result<Option<String>, AuditError> {
    Ok(row.get::<Option<String>>(idx)?)
}

/// Extract an optional JSON value from a TEXT column.
///
/// # Errors
///
/// Returns `AuditError::Query` if the column contains invalid JSON.
pub fn parse_optional_json(s: Option<&str>) -> Result<Option<serde_json::Value>, AuditError> {
    s.map(|s| {
        serde_json::from_str(s)
            .map_err(|e| AuditError::Query(format!("Invalid JSON in column: {e}")))
    })
    .transpose()
}

/// Serialize an optional JSON value for a TEXT column.
///
/// # Errors
///
/// Returns `AuditError::Encoding` if serialization fails.
pub fn optional_json_text(value: Option<&serde_json::Value>) -> Result<Option<String>, AuditError> {
    value
        .map(|v| serde_json::to_string(v).map_err(|e| AuditError::Encoding(e.to_string())))
        .transpose()
}
