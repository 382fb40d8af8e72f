//! File-based storage backend.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Result, StorageBackend, StorageError};

/// Stores each key as `{key}.json` inside a base directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Create the backend, creating `base_dir` if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).map_err(StorageError::Io)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{file_name}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.item_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let value = fs::read_to_string(&path).map_err(StorageError::Io)?;
        tracing::debug!("Loaded {} from {}", key, path.display());

        Ok(Some(value))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.item_path(key);
        let temp_path = path.with_extension("json.tmp");

        fs::write(&temp_path, value).map_err(StorageError::Io)?;
        fs::rename(&temp_path, &path).map_err(StorageError::Io)?;

        tracing::debug!("Saved {} to {}", key, path.display());

        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.item_path(key);

        if path.exists() {
            fs::remove_file(&path).map_err(StorageError::Io)?;
            tracing::debug!("Deleted {}", key);
        }

        Ok(())
    }
}
