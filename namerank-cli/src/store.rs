/// JSON file backend for session records.
///
/// The whole file is one JSON object of key → record. Every write rewrites
/// the file through a temporary sibling and a rename, so a crash mid-write
/// leaves the previous contents in place.
use log::warn;
use namerank_core::{KeyValueStore, StoreError};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub struct JsonFileStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    warn!("Session file {} is not a JSON object, starting empty", path.display());
                    Map::new()
                }
                Err(e) => {
                    warn!("Session file {} is corrupt ({e}), starting empty", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!("Failed to read session file {}: {e}", path.display());
                Map::new()
            }
        };
        JsonFileStore { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir()
            .join(format!("namerank-test-{}-{nanos}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_values_survive_reopen() {
        let path = scratch("sessions.json");
        let mut store = JsonFileStore::open(&path);
        assert!(store.get("k").is_none());
        store.set("k", json!({"matchHistory": []})).unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get("k"), Some(json!({"matchHistory": []})));
        assert_eq!(reopened.keys().count(), 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let path = scratch("sessions.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = JsonFileStore::open(&path);
        assert!(store.get("k").is_none());
        // Writing repairs the file.
        store.set("k", json!(1)).unwrap();
        assert_eq!(JsonFileStore::open(&path).get("k"), Some(json!(1)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_remove() {
        let path = scratch("sessions.json");
        let mut store = JsonFileStore::open(&path);
        store.set("a", json!(1)).unwrap();
        store.set("b", json!(2)).unwrap();
        store.remove("a").unwrap();
        store.remove("missing").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert!(reopened.get("a").is_none());
        assert_eq!(reopened.get("b"), Some(json!(2)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
