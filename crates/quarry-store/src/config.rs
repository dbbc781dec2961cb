use std::path::{Path, PathBuf};

use quarry_core::AppError;

pub const DEFAULT_DATA_DIR: &str = "data";

/// Locations of every file Quarry persists.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `QUARRY_DATA_DIR` (optional, defaults to `data`)
    pub fn from_env() -> Result<Self, AppError> {
        match std::env::var("QUARRY_DATA_DIR") {
            Err(_) => Ok(Self::new(DEFAULT_DATA_DIR)),
            Ok(raw) if raw.trim().is_empty() => Err(AppError::ConfigError(
                "QUARRY_DATA_DIR is set but empty".into(),
            )),
            Ok(raw) => Ok(Self::new(raw)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn quota_path(&self) -> PathBuf {
        self.data_dir.join("quota_usage.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("comment_history.json")
    }

    pub fn resume_path(&self) -> PathBuf {
        self.data_dir.join("resume_state.json")
    }

    /// Directory holding per-resource harvest files and emergency dumps.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }
}
