//! Debounce Backing Stores

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Store errors. The tracker logs these and carries on with its
/// in-memory view rather than failing the run.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable key -> first-observed-time map.
///
/// Implementations must make `set` and `remove` visible to a future
/// process before returning (the file store flushes on every mutation).
pub trait DebounceStore {
    fn get(&self, key: &str) -> Option<DateTime<Utc>>;
    fn set(&mut self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DebounceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).copied()
    }

    fn set(&mut self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), at);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// JSON-file-backed store.
///
/// The whole map is rewritten through a temp file and an atomic rename on
/// every mutation. This is not a hot path; a sync-on-mutate latency cost
/// is acceptable in exchange for restart survival.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: HashMap<String, DateTime<Utc>>,
}

impl FileStore {
    /// Opens the store, loading existing state if the file is present.
    /// An unreadable or corrupt file starts empty rather than failing:
    /// losing in-progress sustain timers is recoverable, refusing to run
    /// is not.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, DateTime<Utc>>>(&raw) {
                Ok(map) => {
                    info!(path = %path.display(), entries = map.len(), "Loaded debounce state");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt debounce state, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, entries }
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DebounceStore for FileStore {
    fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).copied()
    }

    fn set(&mut self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), at);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("debounce-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", at(100)).unwrap();
        assert_eq!(store.get("k"), Some(at(100)));
        store.remove("k").unwrap();
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);

        {
            let mut store = FileStore::open(&path);
            store.set("1001-Tag8-0", at(500)).unwrap();
        }

        let store = FileStore::open(&path);
        assert_eq!(store.get("1001-Tag8-0"), Some(at(500)));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_corrupt_file_starts_empty() {
        let path = temp_path("corrupt");
        fs::write(&path, b"not json at all").unwrap();

        let store = FileStore::open(&path);
        assert!(store.is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_remove_missing_is_idempotent() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);

        let mut store = FileStore::open(&path);
        store.remove("never-set").unwrap();
        store.remove("never-set").unwrap();
        let _ = fs::remove_file(&path);
    }
}
