use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Environment variable that points nibble at a specific database file.
pub const DB_PATH_ENV: &str = "NIBBLE_DB_PATH";

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(DB_PATH_ENV).filter(|p| !p.is_empty()) {
            return Self::with_db_path(PathBuf::from(path));
        }

        let proj_dirs =
            ProjectDirs::from("", "", "nibble").context("Could not determine home directory")?;
        let data_dir = proj_dirs.data_dir().to_path_buf();
        Self::with_db_path(data_dir.join("nibble.db"))
    }

    /// Use `db_path` as the database file, creating its parent directory.
    pub fn with_db_path(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }
        Ok(Config { db_path })
    }
}
