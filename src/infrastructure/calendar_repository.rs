use crate::domain::models::CalendarEvent;
use crate::domain::overlap::overlaps;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::storage::{encode_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait CalendarEventRepository: Send + Sync {
    /// Events whose range intersects `[start, end)`:
    /// `start_time < end AND end_time > start`.
    fn list_events_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, EngineError>;

    fn insert_event(&self, event: &CalendarEvent) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCalendarEventRepository {
    db_path: PathBuf,
}

impl SqliteCalendarEventRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }
}

impl CalendarEventRepository for SqliteCalendarEventRepository {
    fn list_events_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, EngineError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, title, start_time, end_time FROM calendar_events
             WHERE user_id = ?1 AND start_time < ?2 AND end_time > ?3
             ORDER BY start_time ASC",
        )?;
        let rows = statement.query_map(
            params![user_id, encode_timestamp(end), encode_timestamp(start)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )?;

        let mut events = Vec::new();
        for row in rows {
            let (id, user_id, title, start_time, end_time) = row?;
            events.push(CalendarEvent {
                id,
                user_id,
                title,
                start_time: parse_timestamp(&start_time, "calendar_events.start_time")?,
                end_time: parse_timestamp(&end_time, "calendar_events.end_time")?,
            });
        }
        Ok(events)
    }

    fn insert_event(&self, event: &CalendarEvent) -> Result<(), EngineError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO calendar_events (id, user_id, title, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.user_id,
                event.title,
                encode_timestamp(event.start_time),
                encode_timestamp(event.end_time),
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCalendarEventRepository {
    events: Mutex<HashMap<String, CalendarEvent>>,
}

impl CalendarEventRepository for InMemoryCalendarEventRepository {
    fn list_events_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, EngineError> {
        let events = self
            .events
            .lock()
            .map_err(|error| EngineError::Repository(format!("event lock poisoned: {error}")))?;
        let mut matching: Vec<CalendarEvent> = events
            .values()
            .filter(|event| {
                event.user_id == user_id && overlaps(event.start_time, event.end_time, start, end)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|event| event.start_time);
        Ok(matching)
    }

    fn insert_event(&self, event: &CalendarEvent) -> Result<(), EngineError> {
        let mut events = self
            .events
            .lock()
            .map_err(|error| EngineError::Repository(format!("event lock poisoned: {error}")))?;
        events.insert(event.id.clone(), event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use chrono::Duration;
    use tempfile::tempdir;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn sqlite_range_query_excludes_touching_events() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timeblocks.sqlite");
        initialize_database(&path).expect("init db");
        let repository = SqliteCalendarEventRepository::new(&path);

        let base = fixed_time("2026-08-07T09:00:00Z");
        repository
            .insert_event(&CalendarEvent {
                id: "evt-1".to_string(),
                user_id: "user-1".to_string(),
                title: Some("Standup".to_string()),
                start_time: base,
                end_time: base + Duration::minutes(30),
            })
            .expect("insert event");

        let touching = repository
            .list_events_in_range("user-1", base + Duration::minutes(30), base + Duration::hours(2))
            .expect("list");
        assert!(touching.is_empty());

        let overlapping = repository
            .list_events_in_range("user-1", base + Duration::minutes(15), base + Duration::hours(2))
            .expect("list");
        assert_eq!(overlapping.len(), 1);
        assert_eq!(overlapping[0].title.as_deref(), Some("Standup"));
    }
}
