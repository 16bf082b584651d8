//! services/api/src/adapters/local_storage.rs
//!
//! A `LocalStorage` implementation backed by a single JSON object on disk,
//! used by the command-line client to keep its comparison set across runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use smartcart_core::ports::{LocalStorage, PortError, PortResult};
use tracing::warn;

pub struct FileLocalStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileLocalStorage {
    /// Opens the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = read_items(&path);
        Self {
            path,
            items: Mutex::new(items),
        }
    }

    fn items(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, items: &BTreeMap<String, String>) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(items).map_err(|e| PortError::Unexpected(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

fn read_items(path: &Path) -> BTreeMap<String, String> {
    let Ok(text) = fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!(error = %e, path = %path.display(), "Ignoring unreadable local storage file");
        BTreeMap::new()
    })
}

impl LocalStorage for FileLocalStorage {
    fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        let mut items = self.items();
        items.insert(key.to_string(), value.to_string());
        self.flush(&items)
    }

    fn remove_item(&self, key: &str) -> PortResult<()> {
        let mut items = self.items();
        if items.remove(key).is_some() {
            self.flush(&items)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn values_survive_reopening() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = FileLocalStorage::open(&path);
        store.set_item("compare", "[1,2]").unwrap();
        store.set_item("other", "x").unwrap();
        store.remove_item("other").unwrap();

        let reopened = FileLocalStorage::open(&path);
        assert_eq!(reopened.get_item("compare").unwrap().as_deref(), Some("[1,2]"));
        assert_eq!(reopened.get_item("other").unwrap(), None);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileLocalStorage::open(&path);
        assert_eq!(store.get_item("compare").unwrap(), None);
    }
}
