use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde_json::{Map, Value};

use super::ClientStorage;

/// Client storage persisted as a flat JSON object on disk.
///
/// Values are strings, as in browser local storage. A non-string value
/// (e.g. a hand-written nested object) is returned re-encoded as JSON.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> anyhow::Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON object", self.path.display()))
    }

    fn write_map(&self, map: &Map<String, Value>) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let payload = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, payload)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

impl ClientStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let map = match self.read_map() {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "client storage unreadable");
                return None;
            }
        };
        match map.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut map = self.read_map().unwrap_or_default();
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_map(&map)
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// In-process storage, for embedding and tests.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let storage = Self::new();
        if let Ok(mut items) = storage.items.lock() {
            items.insert(super::TOKEN_KEY.to_string(), token.to_string());
        }
        storage
    }
}

impl ClientStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.items
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.items
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage poisoned"))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{get_auth_token, LEGACY_AUTH_KEY};

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested/storage.json"));

        assert_eq!(storage.get_item("token"), None);
        storage.set_item("token", "t-1").unwrap();
        assert_eq!(storage.get_item("token").as_deref(), Some("t-1"));

        storage.remove_item("token").unwrap();
        assert_eq!(storage.get_item("token"), None);
    }

    #[test]
    fn test_file_storage_nested_object_is_reencoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"auth-storage":{"state":{"token":"nested"}}}"#).unwrap();

        let storage = FileStorage::new(&path);
        assert!(storage.get_item(LEGACY_AUTH_KEY).unwrap().contains("nested"));
        assert_eq!(get_auth_token(&storage).as_deref(), Some("nested"));
    }

    #[test]
    fn test_file_storage_corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let storage = FileStorage::new(&path);
        assert_eq!(storage.get_item("token"), None);
        assert_eq!(get_auth_token(&storage), None);
    }

    #[test]
    fn test_memory_storage_with_token() {
        let storage = MemoryStorage::with_token("mem");
        assert_eq!(get_auth_token(&storage).as_deref(), Some("mem"));
    }
}
