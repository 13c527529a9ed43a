use crate::infrastructure::error::EngineError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), EngineError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Fixed-width RFC 3339 so text comparison in SQL matches chronological
/// order.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| EngineError::Repository(format!("invalid {field} '{raw}': {error}")))
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    raw.map(|value| parse_timestamp(&value, field)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn initialize_database_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timeblocks.sqlite");
        initialize_database(&path).expect("first init");
        initialize_database(&path).expect("second init");
    }

    #[test]
    fn timestamps_roundtrip_and_sort_lexicographically() {
        let earlier = DateTime::parse_from_rfc3339("2026-08-07T09:00:00.5Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2026-08-07T09:00:01Z")
            .expect("valid datetime")
            .with_timezone(&Utc);

        let earlier_raw = encode_timestamp(earlier);
        let later_raw = encode_timestamp(later);
        assert!(earlier_raw < later_raw);
        assert_eq!(
            parse_timestamp(&earlier_raw, "target_time").expect("parse"),
            earlier
        );
    }
}
