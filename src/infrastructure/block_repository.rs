use crate::domain::models::{BlockInstance, BlockStatus};
use crate::domain::overlap::overlaps;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::storage::{encode_timestamp, parse_optional_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait BlockRepository: Send + Sync {
    /// Blocks whose stored range intersects `[start, end)`:
    /// `planned_start < end AND planned_end > start`.
    fn list_blocks_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BlockInstance>, EngineError>;

    /// Blocks with `planned_start` in `[start, end)`, the scheduler runner's
    /// lookahead query.
    fn list_blocks_starting_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BlockInstance>, EngineError>;

    fn get_block(&self, user_id: &str, block_id: &str)
        -> Result<Option<BlockInstance>, EngineError>;

    fn insert_block(&self, block: &BlockInstance) -> Result<(), EngineError>;

    /// Full-row update keyed by `block.id`.
    fn update_block(&self, block: &BlockInstance) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct SqliteBlockRepository {
    db_path: PathBuf,
}

impl SqliteBlockRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }
}

type BlockRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

const BLOCK_COLUMNS: &str = "id, user_id, block_type_id, planned_start, planned_end, status, \
     actual_start, actual_end, paused_until, pause_reason, notes";

fn row_to_block(row: BlockRow) -> Result<BlockInstance, EngineError> {
    let (
        id,
        user_id,
        block_type_id,
        planned_start,
        planned_end,
        status,
        actual_start,
        actual_end,
        paused_until,
        pause_reason,
        notes,
    ) = row;
    let status = BlockStatus::parse(&status).ok_or_else(|| {
        EngineError::Repository(format!("invalid block_instances.status '{status}'"))
    })?;
    Ok(BlockInstance {
        id,
        user_id,
        block_type_id,
        planned_start: parse_timestamp(&planned_start, "block_instances.planned_start")?,
        planned_end: parse_timestamp(&planned_end, "block_instances.planned_end")?,
        status,
        actual_start: parse_optional_timestamp(actual_start, "block_instances.actual_start")?,
        actual_end: parse_optional_timestamp(actual_end, "block_instances.actual_end")?,
        paused_until: parse_optional_timestamp(paused_until, "block_instances.paused_until")?,
        pause_reason,
        notes,
    })
}

fn collect_blocks(
    connection: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<BlockInstance>, EngineError> {
    let mut statement = connection.prepare(sql)?;
    let rows = statement.query_map(params, |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
            row.get(10)?,
        ))
    })?;

    let mut blocks = Vec::new();
    for row in rows {
        blocks.push(row_to_block(row?)?);
    }
    Ok(blocks)
}

impl BlockRepository for SqliteBlockRepository {
    fn list_blocks_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BlockInstance>, EngineError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM block_instances
             WHERE user_id = ?1 AND planned_start < ?2 AND planned_end > ?3
             ORDER BY planned_start ASC"
        );
        collect_blocks(
            &connection,
            &sql,
            &[&user_id, &encode_timestamp(end), &encode_timestamp(start)],
        )
    }

    fn list_blocks_starting_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BlockInstance>, EngineError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM block_instances
             WHERE user_id = ?1 AND planned_start >= ?2 AND planned_start < ?3
             ORDER BY planned_start ASC"
        );
        collect_blocks(
            &connection,
            &sql,
            &[&user_id, &encode_timestamp(start), &encode_timestamp(end)],
        )
    }

    fn get_block(
        &self,
        user_id: &str,
        block_id: &str,
    ) -> Result<Option<BlockInstance>, EngineError> {
        let connection = self.connect()?;
        let sql =
            format!("SELECT {BLOCK_COLUMNS} FROM block_instances WHERE user_id = ?1 AND id = ?2");
        let row: Option<BlockRow> = connection
            .query_row(&sql, params![user_id, block_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                ))
            })
            .optional()?;
        row.map(row_to_block).transpose()
    }

    fn insert_block(&self, block: &BlockInstance) -> Result<(), EngineError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO block_instances
             (id, user_id, block_type_id, planned_start, planned_end, status,
              actual_start, actual_end, paused_until, pause_reason, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                block.id,
                block.user_id,
                block.block_type_id,
                encode_timestamp(block.planned_start),
                encode_timestamp(block.planned_end),
                block.status.as_str(),
                block.actual_start.map(encode_timestamp),
                block.actual_end.map(encode_timestamp),
                block.paused_until.map(encode_timestamp),
                block.pause_reason,
                block.notes,
            ],
        )?;
        Ok(())
    }

    fn update_block(&self, block: &BlockInstance) -> Result<(), EngineError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE block_instances SET
               block_type_id = ?3, planned_start = ?4, planned_end = ?5, status = ?6,
               actual_start = ?7, actual_end = ?8, paused_until = ?9,
               pause_reason = ?10, notes = ?11
             WHERE user_id = ?1 AND id = ?2",
            params![
                block.user_id,
                block.id,
                block.block_type_id,
                encode_timestamp(block.planned_start),
                encode_timestamp(block.planned_end),
                block.status.as_str(),
                block.actual_start.map(encode_timestamp),
                block.actual_end.map(encode_timestamp),
                block.paused_until.map(encode_timestamp),
                block.pause_reason,
                block.notes,
            ],
        )?;
        if changed == 0 {
            return Err(EngineError::Repository(format!(
                "block instance '{}' not found",
                block.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlockRepository {
    blocks: Mutex<HashMap<String, BlockInstance>>,
}

impl InMemoryBlockRepository {
    fn locked(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, BlockInstance>>, EngineError>
    {
        self.blocks
            .lock()
            .map_err(|error| EngineError::Repository(format!("block lock poisoned: {error}")))
    }
}

impl BlockRepository for InMemoryBlockRepository {
    fn list_blocks_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BlockInstance>, EngineError> {
        let blocks = self.locked()?;
        let mut matching: Vec<BlockInstance> = blocks
            .values()
            .filter(|block| {
                block.user_id == user_id
                    && overlaps(block.planned_start, block.planned_end, start, end)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|block| block.planned_start);
        Ok(matching)
    }

    fn list_blocks_starting_in_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BlockInstance>, EngineError> {
        let blocks = self.locked()?;
        let mut matching: Vec<BlockInstance> = blocks
            .values()
            .filter(|block| {
                block.user_id == user_id
                    && block.planned_start >= start
                    && block.planned_start < end
            })
            .cloned()
            .collect();
        matching.sort_by_key(|block| block.planned_start);
        Ok(matching)
    }

    fn get_block(
        &self,
        user_id: &str,
        block_id: &str,
    ) -> Result<Option<BlockInstance>, EngineError> {
        let blocks = self.locked()?;
        Ok(blocks
            .get(block_id)
            .filter(|block| block.user_id == user_id)
            .cloned())
    }

    fn insert_block(&self, block: &BlockInstance) -> Result<(), EngineError> {
        let mut blocks = self.locked()?;
        blocks.insert(block.id.clone(), block.clone());
        Ok(())
    }

    fn update_block(&self, block: &BlockInstance) -> Result<(), EngineError> {
        let mut blocks = self.locked()?;
        if !blocks.contains_key(&block.id) {
            return Err(EngineError::Repository(format!(
                "block instance '{}' not found",
                block.id
            )));
        }
        blocks.insert(block.id.clone(), block.clone());
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

    fn sample_block(id: &str, start: DateTime<Utc>) -> BlockInstance {
        BlockInstance {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            block_type_id: "bt-deep".to_string(),
            planned_start: start,
            planned_end: start + Duration::minutes(60),
            status: BlockStatus::Scheduled,
            actual_start: None,
            actual_end: None,
            paused_until: Some(start + Duration::minutes(30)),
            pause_reason: Some("meeting".to_string()),
            notes: None,
        }
    }

    #[test]
    fn sqlite_roundtrip_and_range_queries() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timeblocks.sqlite");
        initialize_database(&path).expect("init db");
        let repository = SqliteBlockRepository::new(&path);

        let base = fixed_time("2026-08-07T09:00:00Z");
        repository
            .insert_block(&sample_block("blk-1", base))
            .expect("insert blk-1");
        repository
            .insert_block(&sample_block("blk-2", base + Duration::hours(3)))
            .expect("insert blk-2");

        let fetched = repository
            .get_block("user-1", "blk-1")
            .expect("get")
            .expect("exists");
        assert_eq!(fetched, sample_block("blk-1", base));
        assert!(repository
            .get_block("other-user", "blk-1")
            .expect("get")
            .is_none());

        // Overlap filter: a window touching blk-1's end must not include it.
        let overlapping = repository
            .list_blocks_in_range("user-1", base + Duration::minutes(60), base + Duration::hours(4))
            .expect("list");
        assert_eq!(overlapping.len(), 1);
        assert_eq!(overlapping[0].id, "blk-2");

        let starting = repository
            .list_blocks_starting_in_range("user-1", base, base + Duration::hours(2))
            .expect("list starting");
        assert_eq!(starting.len(), 1);
        assert_eq!(starting[0].id, "blk-1");
    }

    #[test]
    fn sqlite_update_replaces_row_and_rejects_unknown_id() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timeblocks.sqlite");
        initialize_database(&path).expect("init db");
        let repository = SqliteBlockRepository::new(&path);

        let base = fixed_time("2026-08-07T09:00:00Z");
        let mut block = sample_block("blk-1", base);
        repository.insert_block(&block).expect("insert");

        block.status = BlockStatus::InProgress;
        block.actual_start = Some(base + Duration::minutes(1));
        repository.update_block(&block).expect("update");
        let fetched = repository
            .get_block("user-1", "blk-1")
            .expect("get")
            .expect("exists");
        assert_eq!(fetched.status, BlockStatus::InProgress);
        assert_eq!(fetched.actual_start, Some(base + Duration::minutes(1)));

        let missing = sample_block("blk-missing", base);
        assert!(repository.update_block(&missing).is_err());
    }

    #[test]
    fn in_memory_matches_sqlite_filter_semantics() {
        let repository = InMemoryBlockRepository::default();
        let base = fixed_time("2026-08-07T09:00:00Z");
        repository
            .insert_block(&sample_block("blk-1", base))
            .expect("insert");

        let touching = repository
            .list_blocks_in_range("user-1", base + Duration::minutes(60), base + Duration::hours(2))
            .expect("list");
        assert!(touching.is_empty());

        let overlapping = repository
            .list_blocks_in_range("user-1", base + Duration::minutes(30), base + Duration::hours(2))
            .expect("list");
        assert_eq!(overlapping.len(), 1);
    }
}
