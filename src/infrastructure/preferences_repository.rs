use crate::domain::models::UserPreferences;
use crate::infrastructure::error::EngineError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait PreferencesRepository: Send + Sync {
    fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, EngineError>;

    fn upsert_preferences(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct SqlitePreferencesRepository {
    db_path: PathBuf,
}

impl SqlitePreferencesRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }
}

impl PreferencesRepository for SqlitePreferencesRepository {
    fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, EngineError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                "SELECT notifications_enabled, notification_lead_time_minutes,
                        notification_sound_enabled, standup_time
                 FROM user_preferences WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserPreferences {
                        notifications_enabled: row.get(0)?,
                        notification_lead_time_minutes: row.get(1)?,
                        notification_sound_enabled: row.get(2)?,
                        standup_time: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn upsert_preferences(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
    ) -> Result<(), EngineError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO user_preferences
             (user_id, notifications_enabled, notification_lead_time_minutes,
              notification_sound_enabled, standup_time)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
               notifications_enabled = excluded.notifications_enabled,
               notification_lead_time_minutes = excluded.notification_lead_time_minutes,
               notification_sound_enabled = excluded.notification_sound_enabled,
               standup_time = excluded.standup_time",
            params![
                user_id,
                preferences.notifications_enabled,
                preferences.notification_lead_time_minutes,
                preferences.notification_sound_enabled,
                preferences.standup_time,
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPreferencesRepository {
    preferences: Mutex<HashMap<String, UserPreferences>>,
}

impl PreferencesRepository for InMemoryPreferencesRepository {
    fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, EngineError> {
        let preferences = self.preferences.lock().map_err(|error| {
            EngineError::Repository(format!("preferences lock poisoned: {error}"))
        })?;
        Ok(preferences.get(user_id).cloned())
    }

    fn upsert_preferences(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
    ) -> Result<(), EngineError> {
        let mut stored = self.preferences.lock().map_err(|error| {
            EngineError::Repository(format!("preferences lock poisoned: {error}"))
        })?;
        stored.insert(user_id.to_string(), preferences.clone());
        Ok(())
    }
}
