//! Timestamp and identifier helpers for stored rows
//!
//! All timestamps are persisted as RFC 3339 text in UTC.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored RFC 3339 timestamp
pub fn parse_stored(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Parse a stored UUID column
pub fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_roundtrip_preserves_instant() {
        let ts = now();
        let parsed = parse_stored("created_at", &to_storage(&ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_parse_stored_rejects_garbage() {
        let err = parse_stored("changed_at", "yesterday").unwrap_err();
        assert!(err.to_string().contains("changed_at"));
    }

    #[test]
    fn test_parse_uuid_names_column() {
        assert!(parse_uuid("project_id", &Uuid::new_v4().to_string()).is_ok());
        let err = parse_uuid("project_id", "not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }
}
