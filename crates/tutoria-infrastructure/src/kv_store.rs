//! Key-value store implementations.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tutoria_core::kv::KeyValueStore;
use tutoria_core::{Result, TutoriaError};

use crate::storage::{AtomicJsonError, AtomicJsonFile};

type Entries = BTreeMap<String, String>;

/// Key-value store backed by a single JSON object on disk.
///
/// Entries are cached in memory; every write rewrites the file atomically
/// on the blocking pool.
#[derive(Clone)]
pub struct FileKeyValueStore {
    cache: Arc<Mutex<Entries>>,
    file: AtomicJsonFile<Entries>,
}

impl FileKeyValueStore {
    /// Opens the store, loading existing entries if the file is present.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let file = AtomicJsonFile::<Entries>::new(path);
        let loader = file.clone();
        let entries = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| TutoriaError::internal(format!("Failed to join task: {}", e)))??
            .unwrap_or_default();

        tracing::debug!(
            "[KeyValueStore] Opened {:?} with {} entries",
            file.path(),
            entries.len()
        );

        Ok(Self {
            cache: Arc::new(Mutex::new(entries)),
            file,
        })
    }

    async fn write_through<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Entries) + Send + Clone + 'static,
    {
        let mut cache = self.cache.lock().await;
        let file = self.file.clone();
        let apply = f.clone();
        tokio::task::spawn_blocking(move || {
            file.update(Entries::new(), |entries| {
                apply(entries);
                Ok::<_, AtomicJsonError>(())
            })
        })
        .await
        .map_err(|e| TutoriaError::internal(format!("Failed to join task: {}", e)))??;
        f(&mut cache);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.write_through(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.write_through(move |entries| {
            entries.remove(&key);
        })
        .await
    }
}

/// Process-local key-value store for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
