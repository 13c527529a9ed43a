use crate::domain::models::BlockType;
use crate::infrastructure::error::EngineError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait BlockTypeRepository: Send + Sync {
    fn get_block_type(
        &self,
        user_id: &str,
        block_type_id: &str,
    ) -> Result<Option<BlockType>, EngineError>;

    fn list_block_types(&self, user_id: &str) -> Result<Vec<BlockType>, EngineError>;

    fn insert_block_type(&self, block_type: &BlockType) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct SqliteBlockTypeRepository {
    db_path: PathBuf,
}

impl SqliteBlockTypeRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }
}

type BlockTypeRow = (
    String,
    String,
    String,
    String,
    u32,
    bool,
    Option<String>,
    Option<String>,
    Option<u32>,
);

fn row_to_block_type(row: BlockTypeRow) -> Result<BlockType, EngineError> {
    let (
        id,
        user_id,
        name,
        color,
        default_duration_minutes,
        recurring_enabled,
        recurring_days_of_week,
        recurring_time_of_day,
        recurring_weeks_in_advance,
    ) = row;
    let recurring_days_of_week = match recurring_days_of_week {
        Some(raw) => serde_json::from_str(&raw).map_err(|error| {
            EngineError::Repository(format!(
                "invalid block_types.recurring_days_of_week '{raw}': {error}"
            ))
        })?,
        None => Vec::new(),
    };
    Ok(BlockType {
        id,
        user_id,
        name,
        color,
        default_duration_minutes,
        recurring_enabled,
        recurring_days_of_week,
        recurring_time_of_day,
        recurring_weeks_in_advance,
    })
}

const BLOCK_TYPE_COLUMNS: &str = "id, user_id, name, color, default_duration_minutes, \
     recurring_enabled, recurring_days_of_week, recurring_time_of_day, recurring_weeks_in_advance";

impl BlockTypeRepository for SqliteBlockTypeRepository {
    fn get_block_type(
        &self,
        user_id: &str,
        block_type_id: &str,
    ) -> Result<Option<BlockType>, EngineError> {
        let connection = self.connect()?;
        let sql =
            format!("SELECT {BLOCK_TYPE_COLUMNS} FROM block_types WHERE user_id = ?1 AND id = ?2");
        let row: Option<BlockTypeRow> = connection
            .query_row(&sql, params![user_id, block_type_id], |row| {
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
                ))
            })
            .optional()?;
        row.map(row_to_block_type).transpose()
    }

    fn list_block_types(&self, user_id: &str) -> Result<Vec<BlockType>, EngineError> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT {BLOCK_TYPE_COLUMNS} FROM block_types WHERE user_id = ?1 ORDER BY name ASC"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map(params![user_id], |row| {
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
            ))
        })?;

        let mut block_types = Vec::new();
        for row in rows {
            block_types.push(row_to_block_type(row?)?);
        }
        Ok(block_types)
    }

    fn insert_block_type(&self, block_type: &BlockType) -> Result<(), EngineError> {
        let connection = self.connect()?;
        let recurring_days = serde_json::to_string(&block_type.recurring_days_of_week)?;
        connection.execute(
            "INSERT INTO block_types
             (id, user_id, name, color, default_duration_minutes, recurring_enabled,
              recurring_days_of_week, recurring_time_of_day, recurring_weeks_in_advance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                block_type.id,
                block_type.user_id,
                block_type.name,
                block_type.color,
                block_type.default_duration_minutes,
                block_type.recurring_enabled,
                recurring_days,
                block_type.recurring_time_of_day,
                block_type.recurring_weeks_in_advance,
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlockTypeRepository {
    block_types: Mutex<HashMap<String, BlockType>>,
}

impl InMemoryBlockTypeRepository {
    fn locked(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, BlockType>>, EngineError> {
        self.block_types
            .lock()
            .map_err(|error| EngineError::Repository(format!("block type lock poisoned: {error}")))
    }
}

impl BlockTypeRepository for InMemoryBlockTypeRepository {
    fn get_block_type(
        &self,
        user_id: &str,
        block_type_id: &str,
    ) -> Result<Option<BlockType>, EngineError> {
        let block_types = self.locked()?;
        Ok(block_types
            .get(block_type_id)
            .filter(|block_type| block_type.user_id == user_id)
            .cloned())
    }

    fn list_block_types(&self, user_id: &str) -> Result<Vec<BlockType>, EngineError> {
        let block_types = self.locked()?;
        let mut matching: Vec<BlockType> = block_types
            .values()
            .filter(|block_type| block_type.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    fn insert_block_type(&self, block_type: &BlockType) -> Result<(), EngineError> {
        let mut block_types = self.locked()?;
        block_types.insert(block_type.id.clone(), block_type.clone());
        Ok(())
    }
}
