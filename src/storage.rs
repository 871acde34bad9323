//! Local key-value storage for the credential and the chat history.
//!
//! Two variants behind one trait: `FileStore` (JSON files under a config
//! dir) and `MemoryStore` (transient). The binary picks one at startup and
//! injects it; call sites never probe the platform.

use crate::error::AppError;
use crate::schema::{ApiKeyConfig, Message};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_KEY: &str = "api_key";
pub const CHAT_HISTORY_KEY: &str = "chat_history";

/// Most recent messages retained in the stored history.
pub const MAX_MESSAGES: usize = 20;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&mut self, key: &str) -> Result<(), AppError>;
}

/// Persistent variant: one JSON file per key under `base_dir`.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(base_dir)?;
        Ok(FileStore {
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn default_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".polaris").join("storage")
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        fs::write(self.key_path(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), AppError> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Transient variant for environments without a writable config dir.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), AppError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Startup selection: persistent store when the config dir is writable,
/// otherwise the transient store.
pub fn open_default() -> Box<dyn KeyValueStore> {
    match FileStore::new(&FileStore::default_dir()) {
        Ok(store) => Box::new(store),
        Err(e) => {
            eprintln!("⚠️ Persistent storage unavailable ({}). Using in-memory store.", e);
            Box::new(MemoryStore::new())
        }
    }
}

// ---- Typed helpers over the raw string store ----

pub fn save_api_key(store: &mut dyn KeyValueStore, api_key: &str) -> Result<(), AppError> {
    let config = ApiKeyConfig::new(api_key);
    store.put(API_KEY_KEY, &serde_json::to_string(&config)?)
}

/// Missing or unreadable both come back as None.
pub fn load_api_key(store: &dyn KeyValueStore) -> Option<ApiKeyConfig> {
    let raw = store.get(API_KEY_KEY).ok().flatten()?;
    serde_json::from_str(&raw).ok()
}

pub fn has_api_key(store: &dyn KeyValueStore) -> bool {
    load_api_key(store).is_some()
}

pub fn clear_api_key(store: &mut dyn KeyValueStore) -> Result<(), AppError> {
    store.remove(API_KEY_KEY)
}

pub fn save_chat_history(
    store: &mut dyn KeyValueStore,
    messages: &[Message],
) -> Result<(), AppError> {
    let start = messages.len().saturating_sub(MAX_MESSAGES);
    store.put(CHAT_HISTORY_KEY, &serde_json::to_string(&messages[start..])?)
}

pub fn load_chat_history(store: &dyn KeyValueStore) -> Vec<Message> {
    store
        .get(CHAT_HISTORY_KEY)
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

pub fn clear_chat_history(store: &mut dyn KeyValueStore) -> Result<(), AppError> {
    store.remove(CHAT_HISTORY_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Role;
    use tempfile::tempdir;

    #[test]
    fn test_api_key_round_trip() -> Result<(), AppError> {
        let dir = tempdir()?;
        let mut store = FileStore::new(dir.path())?;

        save_api_key(&mut store, "sk-or-test-123")?;
        let loaded = load_api_key(&store).unwrap();
        assert_eq!(loaded.api_key, "sk-or-test-123");
        assert!(has_api_key(&store));

        clear_api_key(&mut store)?;
        assert!(load_api_key(&store).is_none());
        Ok(())
    }

    #[test]
    fn test_missing_key_reads_as_none() -> Result<(), AppError> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path())?;
        assert!(store.get("nope")?.is_none());
        assert!(load_api_key(&store).is_none());
        Ok(())
    }

    #[test]
    fn test_overwrite_is_wholesale() -> Result<(), AppError> {
        let mut store = MemoryStore::new();
        save_api_key(&mut store, "first")?;
        save_api_key(&mut store, "second")?;
        assert_eq!(load_api_key(&store).unwrap().api_key, "second");
        Ok(())
    }

    #[test]
    fn test_chat_history_keeps_most_recent_20() -> Result<(), AppError> {
        let dir = tempdir()?;
        let mut store = FileStore::new(dir.path())?;

        let messages: Vec<Message> = (0..25)
            .map(|i| Message::new(Role::User, &format!("msg {}", i)))
            .collect();
        save_chat_history(&mut store, &messages)?;

        let loaded = load_chat_history(&store);
        assert_eq!(loaded.len(), MAX_MESSAGES);
        assert_eq!(loaded[0].content, "msg 5");
        assert_eq!(loaded[19].content, "msg 24");
        Ok(())
    }

    #[test]
    fn test_corrupt_history_reads_as_empty() -> Result<(), AppError> {
        let mut store = MemoryStore::new();
        store.put(CHAT_HISTORY_KEY, "not json")?;
        assert!(load_chat_history(&store).is_empty());
        Ok(())
    }
}
