use crate::domain::models::{NotificationPayload, NotificationQueueItem, NotificationType};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::storage::{encode_timestamp, parse_optional_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait NotificationRepository: Send + Sync {
    fn insert_notifications(&self, items: &[NotificationQueueItem]) -> Result<(), EngineError>;

    /// Target times of queued rows (sent or not) with `target_time` in
    /// `[start, end]`, the reconciliation dedup window.
    fn queued_target_times(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, EngineError>;

    /// Unsent rows with `target_time <= now`, ascending by target time.
    fn list_due(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationQueueItem>, EngineError>;

    /// Sets `sent_at` for the given ids; rows already marked stay untouched.
    fn mark_sent(&self, ids: &[String], sent_at: DateTime<Utc>) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct SqliteNotificationRepository {
    db_path: PathBuf,
}

impl SqliteNotificationRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }
}

type NotificationRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
);

fn row_to_item(row: NotificationRow) -> Result<NotificationQueueItem, EngineError> {
    let (id, user_id, raw_type, target_time, payload, created_at, sent_at) = row;
    let notification_type = NotificationType::parse(&raw_type).ok_or_else(|| {
        EngineError::Repository(format!("invalid notification_queue.type '{raw_type}'"))
    })?;
    let payload: NotificationPayload = match payload {
        Some(raw) => serde_json::from_str(&raw)?,
        None => {
            return Err(EngineError::Repository(format!(
                "notification '{id}' has no payload"
            )))
        }
    };
    Ok(NotificationQueueItem {
        id,
        user_id,
        notification_type,
        target_time: parse_timestamp(&target_time, "notification_queue.target_time")?,
        payload,
        created_at: parse_timestamp(&created_at, "notification_queue.created_at")?,
        sent_at: parse_optional_timestamp(sent_at, "notification_queue.sent_at")?,
    })
}

impl NotificationRepository for SqliteNotificationRepository {
    fn insert_notifications(&self, items: &[NotificationQueueItem]) -> Result<(), EngineError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        for item in items {
            transaction.execute(
                "INSERT INTO notification_queue
                 (id, user_id, type, target_time, payload, created_at, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.id,
                    item.user_id,
                    item.notification_type.as_str(),
                    encode_timestamp(item.target_time),
                    serde_json::to_string(&item.payload)?,
                    encode_timestamp(item.created_at),
                    item.sent_at.map(encode_timestamp),
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    fn queued_target_times(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, EngineError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT target_time FROM notification_queue
             WHERE user_id = ?1 AND target_time >= ?2 AND target_time <= ?3",
        )?;
        let rows = statement.query_map(
            params![user_id, encode_timestamp(start), encode_timestamp(end)],
            |row| row.get::<_, String>(0),
        )?;

        let mut targets = Vec::new();
        for row in rows {
            targets.push(parse_timestamp(&row?, "notification_queue.target_time")?);
        }
        Ok(targets)
    }

    fn list_due(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationQueueItem>, EngineError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, user_id, type, target_time, payload, created_at, sent_at
             FROM notification_queue
             WHERE user_id = ?1 AND sent_at IS NULL AND target_time <= ?2
             ORDER BY target_time ASC
             LIMIT ?3",
        )?;
        let rows = statement.query_map(
            params![user_id, encode_timestamp(now), limit as i64],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row_to_item(row?)?);
        }
        Ok(items)
    }

    fn mark_sent(&self, ids: &[String], sent_at: DateTime<Utc>) -> Result<(), EngineError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        for id in ids {
            transaction.execute(
                "UPDATE notification_queue SET sent_at = ?2 WHERE id = ?1 AND sent_at IS NULL",
                params![id, encode_timestamp(sent_at)],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationRepository {
    items: Mutex<HashMap<String, NotificationQueueItem>>,
}

impl InMemoryNotificationRepository {
    fn locked(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, NotificationQueueItem>>, EngineError>
    {
        self.items
            .lock()
            .map_err(|error| EngineError::Repository(format!("queue lock poisoned: {error}")))
    }

    /// Test and tooling helper: every stored row, unordered.
    pub fn all_items(&self) -> Result<Vec<NotificationQueueItem>, EngineError> {
        Ok(self.locked()?.values().cloned().collect())
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn insert_notifications(&self, items: &[NotificationQueueItem]) -> Result<(), EngineError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut stored = self.locked()?;
        for item in items {
            stored.insert(item.id.clone(), item.clone());
        }
        Ok(())
    }

    fn queued_target_times(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, EngineError> {
        let stored = self.locked()?;
        Ok(stored
            .values()
            .filter(|item| {
                item.user_id == user_id && item.target_time >= start && item.target_time <= end
            })
            .map(|item| item.target_time)
            .collect())
    }

    fn list_due(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationQueueItem>, EngineError> {
        let stored = self.locked()?;
        let mut due: Vec<NotificationQueueItem> = stored
            .values()
            .filter(|item| {
                item.user_id == user_id && item.sent_at.is_none() && item.target_time <= now
            })
            .cloned()
            .collect();
        due.sort_by_key(|item| item.target_time);
        due.truncate(limit);
        Ok(due)
    }

    fn mark_sent(&self, ids: &[String], sent_at: DateTime<Utc>) -> Result<(), EngineError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut stored = self.locked()?;
        for id in ids {
            if let Some(item) = stored.get_mut(id) {
                if item.sent_at.is_none() {
                    item.sent_at = Some(sent_at);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BlockPayload, StandupPayload};
    use crate::infrastructure::storage::initialize_database;
    use chrono::Duration;
    use tempfile::tempdir;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_item(id: &str, target_time: DateTime<Utc>) -> NotificationQueueItem {
        NotificationQueueItem {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            notification_type: NotificationType::BlockUpcoming,
            target_time,
            payload: NotificationPayload::Block(BlockPayload {
                block_name: Some("Deep Work".to_string()),
                block_color: None,
                lead_minutes: Some(10),
                block_type_id: "bt-deep".to_string(),
                block_instance_id: "blk-1".to_string(),
                start_time: target_time + Duration::minutes(10),
            }),
            created_at: fixed_time("2026-08-07T08:00:00Z"),
            sent_at: None,
        }
    }

    #[test]
    fn sqlite_due_listing_orders_and_filters() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timeblocks.sqlite");
        initialize_database(&path).expect("init db");
        let repository = SqliteNotificationRepository::new(&path);

        let now = fixed_time("2026-08-07T12:00:00Z");
        let mut standup = sample_item("ntf-3", now - Duration::minutes(1));
        standup.notification_type = NotificationType::Standup;
        standup.payload = NotificationPayload::Standup(StandupPayload {
            time: "09:00".to_string(),
        });
        repository
            .insert_notifications(&[
                sample_item("ntf-1", now - Duration::minutes(10)),
                sample_item("ntf-2", now + Duration::minutes(10)),
                standup,
            ])
            .expect("insert");

        let due = repository.list_due("user-1", now, 100).expect("list due");
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, "ntf-1");
        assert_eq!(due[1].id, "ntf-3");

        repository
            .mark_sent(&["ntf-1".to_string()], now)
            .expect("mark sent");
        let due = repository.list_due("user-1", now, 100).expect("list due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "ntf-3");
    }

    #[test]
    fn sqlite_sent_marker_is_immutable() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timeblocks.sqlite");
        initialize_database(&path).expect("init db");
        let repository = SqliteNotificationRepository::new(&path);

        let now = fixed_time("2026-08-07T12:00:00Z");
        repository
            .insert_notifications(&[sample_item("ntf-1", now - Duration::minutes(10))])
            .expect("insert");
        repository
            .mark_sent(&["ntf-1".to_string()], now)
            .expect("first mark");
        repository
            .mark_sent(&["ntf-1".to_string()], now + Duration::hours(1))
            .expect("second mark is a no-op");

        // Queued target times still include the sent row, so reconciliation
        // will not re-insert the same target.
        let targets = repository
            .queued_target_times("user-1", now - Duration::hours(1), now + Duration::hours(1))
            .expect("targets");
        assert_eq!(targets, vec![now - Duration::minutes(10)]);
        assert!(repository.list_due("user-1", now, 100).expect("due").is_empty());
    }

    #[test]
    fn sqlite_payload_roundtrips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timeblocks.sqlite");
        initialize_database(&path).expect("init db");
        let repository = SqliteNotificationRepository::new(&path);

        let now = fixed_time("2026-08-07T12:00:00Z");
        let item = sample_item("ntf-1", now - Duration::minutes(1));
        repository.insert_notifications(&[item.clone()]).expect("insert");

        let due = repository.list_due("user-1", now, 100).expect("due");
        assert_eq!(due, vec![item]);
    }
}
