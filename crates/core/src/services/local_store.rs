//! Profile-scoped key-value storage for the local backend.
//!
//! Every handle cloned from one store shares its entries and its change
//! channel. Writes do not announce themselves: whoever writes decides what
//! to broadcast, the same way a page has to dispatch its own storage event
//! for listeners in the same context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use votebattle_common::{AppError, AppResult};

/// Capacity of the change channel.
const EVENT_CAPACITY: usize = 256;

/// A change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// The key that changed.
    pub key: String,
    /// The new value, `None` when the key was removed.
    pub new_value: Option<String>,
}

/// String-keyed storage with a change channel.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Write a value.
    async fn set(&self, key: &str, value: String) -> AppResult<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> AppResult<()>;

    /// All keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>>;

    /// Announce a change to every watcher.
    fn broadcast(&self, event: StorageEvent);

    /// Listen for announced changes.
    fn watch(&self) -> broadcast::Receiver<StorageEvent>;
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// In-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            events,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(matching_keys(&*self.entries.read().await, prefix))
    }

    fn broadcast(&self, event: StorageEvent) {
        // No watchers is fine.
        let _ = self.events.send(event);
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

/// Store persisted as one JSON document on disk.
///
/// The whole document is rewritten on every change (write to a temporary
/// file, then rename).
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: Arc<RwLock<BTreeMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl FileStore {
    /// Open the store at `path`, creating parent directories as needed.
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        info!(path = %path.display(), keys = entries.len(), "Opened local vote store");

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            events,
        })
    }

    /// Location of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");

        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to replace file: {e}")))?;

        debug!(path = %self.path.display(), "Persisted local vote store");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.persist(&entries).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        if let Some(old) = entries.remove(key)
            && let Err(e) = self.persist(&entries).await
        {
            entries.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(matching_keys(&*self.entries.read().await, prefix))
    }

    fn broadcast(&self, event: StorageEvent) {
        let _ = self.events.send(event);
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

fn matching_keys(entries: &BTreeMap<String, String>, prefix: &str) -> Vec<String> {
    entries
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_store_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("votebattle-store-{}-{name}", std::process::id()))
            .join("store.json")
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let store = MemoryStore::new();
        for key in ["vote:1:2", "vote:3:4", "votes", "other"] {
            store.set(key, String::new()).await.unwrap();
        }

        let keys = store.keys_with_prefix("vote:").await.unwrap();
        assert_eq!(keys, vec!["vote:1:2".to_string(), "vote:3:4".to_string()]);
    }

    #[tokio::test]
    async fn test_cloned_handles_share_changes() {
        let store = MemoryStore::new();
        let other = store.clone();
        let mut events = other.watch();

        store.set("k", "v".to_string()).await.unwrap();
        store.broadcast(StorageEvent {
            key: "k".to_string(),
            new_value: Some("v".to_string()),
        });

        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(events.recv().await.unwrap().key, "k");
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = temp_store_path("reopen");
        let _ = tokio::fs::remove_file(&path).await;

        let store = FileStore::open(&path).await.unwrap();
        store.set("battle:1:25", "{}".to_string()).await.unwrap();
        store.set("marker", "a".to_string()).await.unwrap();
        store.remove("marker").await.unwrap();
        drop(store);

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("battle:1:25").await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(reopened.get("marker").await.unwrap(), None);

        tokio::fs::remove_dir_all(path.parent().unwrap()).await.ok();
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_document() {
        let path = temp_store_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = FileStore::open(&path).await;
        assert!(matches!(result, Err(AppError::Serialization(_))));

        tokio::fs::remove_dir_all(path.parent().unwrap()).await.ok();
    }
}
