//! File-backed legacy location.
//!
//! Desktop builds of the portal wrote the session to a flat JSON object in the
//! platform data directory:
//!
//! ```json
//! { "accessToken": "...", "refreshToken": "..." }
//! ```
//!
//! Stored at `~/.local/share/weftgate/session.json` on Linux,
//! `~/Library/Application Support/dev.weftgate.weftgate/session.json` on macOS
//! and `%APPDATA%\weftgate\weftgate\data\session.json` on Windows.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{LegacyStore, StoreError};
use crate::secret::Secret;

/// Legacy session file.
///
/// The file is read on every access so that a file written by another
/// process between calls is still observed.
#[derive(Debug, Clone)]
pub struct FileLegacyStore {
    path: PathBuf,
}

impl FileLegacyStore {
    /// Get the default path of the legacy session file.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("dev", "weftgate", "weftgate")
            .ok_or(StoreError::DataDirUnavailable)?;
        Ok(dirs.data_dir().join("session.json"))
    }

    /// Open the legacy session file at its default location.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(Self::default_path()?))
    }

    /// Use a legacy session file at a specific path.
    ///
    /// The file does not have to exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

#[async_trait]
impl LegacyStore for FileLegacyStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let entries = self.read_entries()?;
        Ok(entries.get(key).map(Secret::new))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileLegacyStore::new(temp.path().join("session.json"));

        assert!(store.get("accessToken").await.unwrap().is_none());
        store.remove("accessToken").await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_remove_keeps_other_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session.json");
        fs::write(&path, r#"{"accessToken":"a1","theme":"dark"}"#).unwrap();

        let store = FileLegacyStore::new(&path);
        assert_eq!(store.get("accessToken").await.unwrap().unwrap().expose(), "a1");

        store.remove("accessToken").await.unwrap();

        assert!(store.get("accessToken").await.unwrap().is_none());
        assert_eq!(store.get("theme").await.unwrap().unwrap().expose(), "dark");
    }

    #[tokio::test]
    async fn test_removing_last_entry_deletes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session.json");
        fs::write(&path, r#"{"accessToken":"a1"}"#).unwrap();

        let store = FileLegacyStore::new(&path);
        store.remove("accessToken").await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session.json");
        fs::write(&path, "not json").unwrap();

        let store = FileLegacyStore::new(&path);
        let result = store.get("accessToken").await;
        assert!(matches!(result, Err(StoreError::SerializationError(_))));
    }
}
