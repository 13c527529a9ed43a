use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid time range: {0}")]
    InvalidRange(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Repository error: {0}")]
    Repository(String),
    #[error("Notification error: {0}")]
    Notification(String),
}
