use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Utc};

/// Validated half-open time range. `start < end` strictly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, EngineError> {
        assert_valid_range(start, end)?;
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// Half-open interval intersection: touching endpoints do not overlap.
pub fn overlaps(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// Overlap test over RFC 3339 serialized bounds.
pub fn overlaps_str(
    start1: &str,
    end1: &str,
    start2: &str,
    end2: &str,
) -> Result<bool, EngineError> {
    Ok(overlaps(
        parse_instant(start1)?,
        parse_instant(end1)?,
        parse_instant(start2)?,
        parse_instant(end2)?,
    ))
}

pub fn assert_valid_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), EngineError> {
    if start >= end {
        return Err(EngineError::InvalidRange(format!(
            "end must be after start (start={start}, end={end})"
        )));
    }
    Ok(())
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| EngineError::InvalidRange(format!("invalid instant '{raw}': {error}")))
}
