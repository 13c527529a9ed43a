use crate::infrastructure::config::{ensure_default_configs, load_notification_settings};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
}

/// Create the workspace layout, seed missing config files and initialize
/// the database.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, EngineError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("timeblocks.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let _ = load_notification_settings(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bootstrap_creates_layout_and_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let result = bootstrap_workspace(dir.path()).expect("bootstrap");
        assert!(result.config_dir.join("notifications.json").exists());
        assert!(result.database_path.exists());

        bootstrap_workspace(dir.path()).expect("second bootstrap");
    }
}
