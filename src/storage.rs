use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub new_value: Value,
}

/// Keys written by one `set` call, with their new values.
pub type StorageChanges = HashMap<String, ValueChange>;

/// Async key-value store shared by settings and the duration cache.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Missing keys are simply absent from the result.
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    async fn set(&self, values: HashMap<String, Value>) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges>;
}

fn changes_of(values: &HashMap<String, Value>) -> StorageChanges {
    values
        .iter()
        .map(|(key, value)| {
            (
                key.clone(),
                ValueChange {
                    new_value: value.clone(),
                },
            )
        })
        .collect()
}

/// JSON object on disk, replaced atomically on every write.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<StorageChanges>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading store {}", path.display()))?;
            match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(values) => values,
                Err(e) => {
                    warn!("store {} is corrupt, starting empty: {}", path.display(), e);
                    Map::new()
                }
            }
        } else {
            Map::new()
        };
        let (changes, _) = broadcast::channel(32);
        Ok(FileStore {
            path,
            values: Mutex::new(values),
            changes,
        })
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path)?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let values = self.values.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, values: HashMap<String, Value>) -> Result<()> {
        let changes = changes_of(&values);
        let mut stored = self.values.lock().await;
        stored.extend(values);
        let bytes = serde_json::to_vec(&*stored)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await?
            .with_context(|| format!("writing store {}", self.path.display()))?;
        drop(stored);

        debug!("persisted {} key(s) to {}", changes.len(), self.path.display());
        let _ = self.changes.send(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.changes.subscribe()
    }
}

/// Process-local store; nothing survives a restart.
pub struct MemoryStore {
    values: Cache<String, Value>,
    changes: broadcast::Sender<StorageChanges>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(32);
        MemoryStore {
            values: Cache::builder().build(),
            changes,
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
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(value) = self.values.get(*key).await {
                found.insert(key.to_string(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, values: HashMap<String, Value>) -> Result<()> {
        let changes = changes_of(&values);
        for (key, value) in values {
            self.values.insert(key, value).await;
        }
        let _ = self.changes.send(changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.changes.subscribe()
    }
}
