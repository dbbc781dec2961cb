use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use quarry_core::AppError;
use quarry_core::traits::SnapshotStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

/// Write `content` to `path` through a temp file in the same directory, so
/// readers never observe a half-written file.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), AppError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| io_error("create directory", dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error("create temp file", dir, e))?;
    let write = |tmp: &mut NamedTempFile| -> std::io::Result<()> {
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()
    };
    write(&mut tmp).map_err(|e| io_error("write", path, e))?;
    tmp.persist(path)
        .map_err(|e| io_error("replace", path, e.error))?;
    Ok(())
}

pub(crate) fn io_error(action: &str, path: &Path, e: std::io::Error) -> AppError {
    AppError::LedgerIo(format!("Failed to {action} {}: {e}", path.display()))
}

/// A snapshot document stored as pretty-printed JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore<T> {
    path: PathBuf,
    _snapshot: PhantomData<fn() -> T>,
}

impl<T> JsonSnapshotStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _snapshot: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> SnapshotStore<T> for JsonSnapshotStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>, AppError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &self.path, e)),
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            AppError::LedgerIo(format!("Corrupt snapshot {}: {e}", self.path.display()))
        })
    }

    fn save(&self, snapshot: &T) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &json)?;
        tracing::debug!(path = %self.path.display(), bytes = json.len(), "Snapshot saved");
        Ok(())
    }
}
