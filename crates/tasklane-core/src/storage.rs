use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const TOKEN_KEY: &str = "token";
pub const DARK_MODE_KEY: &str = "darkMode";

/// String key-value persistence the session and preferences depend on.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// JSON object on disk, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join("state.json");

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed parsing {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), keys = entries.len(), "opened state store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        save_atomic(&self.path, &next)?;
        *entries = next;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        save_atomic(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

fn save_atomic(path: &Path, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = entries.len(), "saving state atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string_pretty(entries)?;
    writeln!(temp, "{serialized}")?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.entries.lock().insert(key.to_string(), value.to_string());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_survives_reopen() {
        let temp = tempdir().expect("tempdir");
        {
            let store = FileStore::open(temp.path()).expect("open store");
            store.set(TOKEN_KEY, "abc").expect("set token");
            store.set(DARK_MODE_KEY, "true").expect("set theme");
            store.remove(DARK_MODE_KEY).expect("remove theme");
        }

        let reopened = FileStore::open(temp.path()).expect("reopen store");
        assert_eq!(reopened.get(TOKEN_KEY).expect("get"), Some("abc".to_string()));
        assert_eq!(reopened.get(DARK_MODE_KEY).expect("get"), None);
    }

    #[test]
    fn failed_save_leaves_previous_values() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("state");
        let store = FileStore::open(&dir).expect("open store");
        store.set(TOKEN_KEY, "abc").expect("set token");

        fs::remove_dir_all(&dir).expect("remove data dir");

        assert!(store.set(TOKEN_KEY, "xyz").is_err());
        assert_eq!(store.get(TOKEN_KEY).expect("get"), Some("abc".to_string()));
        assert!(store.remove(TOKEN_KEY).is_err());
        assert_eq!(store.get(TOKEN_KEY).expect("get"), Some("abc".to_string()));
    }

    #[test]
    fn file_store_rejects_corrupt_state() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("state.json"), "{not json").expect("write");
        assert!(FileStore::open(temp.path()).is_err());
    }

    #[test]
    fn memory_store_remove_is_idempotent() {
        let store = MemoryStore::with_entry(TOKEN_KEY, "abc");
        store.remove(TOKEN_KEY).expect("remove");
        store.remove(TOKEN_KEY).expect("remove again");
        assert_eq!(store.get(TOKEN_KEY).expect("get"), None);
    }
}
