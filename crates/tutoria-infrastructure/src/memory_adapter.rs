//! In-process persistence adapter.
//!
//! Keeps each collection as an ordered list of documents and pushes a full
//! snapshot to subscribers after every write. When opened with a key-value
//! store, each collection is also serialized under its fixed key (`sectors`,
//! `tutorials`, `users`) and restored from there on open.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tutoria_core::kv::{KeyValueStore, SECTORS_KEY, TUTORIALS_KEY, USERS_KEY, get_json, set_json};
use tutoria_core::{
    BackendKind, ChangeHandler, Collection, Document, Fields, PersistenceAdapter, Result,
    Subscription, TutoriaError,
};
use uuid::Uuid;

use crate::listeners::ListenerRegistry;

pub(crate) fn snapshot_key(collection: Collection) -> &'static str {
    match collection {
        Collection::Sectors => SECTORS_KEY,
        Collection::Tutorials => TUTORIALS_KEY,
        Collection::Users => USERS_KEY,
    }
}

pub struct MemoryAdapter {
    tables: RwLock<HashMap<Collection, Vec<Document>>>,
    listeners: Arc<ListenerRegistry>,
    snapshot: Option<Arc<dyn KeyValueStore>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// Creates an empty adapter with no snapshot persistence.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            listeners: ListenerRegistry::new(),
            snapshot: None,
        }
    }

    /// Creates an adapter that mirrors every collection into `store`.
    ///
    /// Existing snapshots are loaded. A snapshot that fails to parse is
    /// logged and treated as empty.
    pub async fn with_snapshot(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut tables = HashMap::new();
        for collection in Collection::ALL {
            let key = snapshot_key(collection);
            match get_json::<Vec<Document>>(store.as_ref(), key).await {
                Ok(Some(documents)) => {
                    tables.insert(collection, documents);
                }
                Ok(None) => {}
                Err(e) if matches!(e, TutoriaError::Serialization { .. }) => {
                    tracing::warn!("[MemoryAdapter] Ignoring unreadable snapshot '{}': {}", key, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self {
            tables: RwLock::new(tables),
            listeners: ListenerRegistry::new(),
            snapshot: Some(store),
        })
    }

    /// Persists the snapshot (if configured) and notifies listeners.
    ///
    /// Callers hold the `tables` write guard across this call, so snapshots
    /// are persisted and pushed in write order.
    async fn publish(&self, collection: Collection, documents: Vec<Document>) -> Result<()> {
        let persisted = match &self.snapshot {
            Some(store) => set_json(store.as_ref(), snapshot_key(collection), &documents).await,
            None => Ok(()),
        };
        self.listeners.notify(collection, &documents);
        persisted
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn supports_live_updates(&self) -> bool {
        true
    }

    async fn subscribe(&self, collection: Collection, on_change: ChangeHandler) -> Result<Subscription> {
        let subscription = self.listeners.register(collection, on_change.clone());
        let current = self.load(collection).await?;
        on_change(collection, current);
        Ok(subscription)
    }

    async fn load(&self, collection: Collection) -> Result<Vec<Document>> {
        Ok(self
            .tables
            .read()
            .await
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, collection: Collection, fields: Fields) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        table.push(Document::new(id.clone(), fields));
        let snapshot = table.clone();
        self.publish(collection, snapshot).await?;
        Ok(id)
    }

    async fn put(&self, collection: Collection, document: Document) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        match table.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => table.push(document),
        }
        let snapshot = table.clone();
        self.publish(collection, snapshot).await
    }

    async fn update(&self, collection: Collection, id: &str, partial: Fields) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        let document = table
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| TutoriaError::not_found(collection.entity_type(), id))?;
        document.merge(&partial);
        let snapshot = table.clone();
        self.publish(collection, snapshot).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        let before = table.len();
        table.retain(|d| d.id != id);
        if table.len() == before {
            return Ok(());
        }
        let snapshot = table.clone();
        self.publish(collection, snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryKeyValueStore;
    use serde_json::json;
    use std::sync::Mutex;

    fn fields(value: serde_json::Value) -> Fields {
        tutoria_core::document::to_fields(&value).unwrap()
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let adapter = MemoryAdapter::new();
        let id = adapter
            .create(Collection::Sectors, fields(json!({"name": "Produção"})))
            .await
            .unwrap();

        adapter
            .update(Collection::Sectors, &id, fields(json!({"name": "Qualidade"})))
            .await
            .unwrap();
        let docs = adapter.load(Collection::Sectors).await.unwrap();
        assert_eq!(docs[0].fields["name"], json!("Qualidade"));

        adapter.delete(Collection::Sectors, &id).await.unwrap();
        assert!(adapter.load(Collection::Sectors).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let adapter = MemoryAdapter::new();
        let err = adapter
            .update(Collection::Tutorials, "nope", Fields::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_subscribers_receive_full_snapshots() {
        let adapter = MemoryAdapter::new();
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let subscription = adapter
            .subscribe(
                Collection::Sectors,
                Arc::new(move |_, docs| sink.lock().unwrap().push(docs.len())),
            )
            .await
            .unwrap();

        adapter
            .create(Collection::Sectors, fields(json!({"name": "A"})))
            .await
            .unwrap();
        adapter
            .create(Collection::Sectors, fields(json!({"name": "B"})))
            .await
            .unwrap();
        adapter
            .create(Collection::Users, fields(json!({"name": "ignored"})))
            .await
            .unwrap();

        subscription.unsubscribe();
        adapter
            .create(Collection::Sectors, fields(json!({"name": "C"})))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_snapshot_restores_collections() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());

        let adapter = MemoryAdapter::with_snapshot(store.clone()).await.unwrap();
        adapter
            .put(
                Collection::Sectors,
                Document::new("1", fields(json!({"name": "Produção"}))),
            )
            .await
            .unwrap();
        assert!(store.get(SECTORS_KEY).await.unwrap().is_some());

        let restored = MemoryAdapter::with_snapshot(store).await.unwrap();
        let docs = restored.load(Collection::Sectors).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "1");
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let adapter = MemoryAdapter::new();
        adapter
            .put(Collection::Sectors, Document::new("1", fields(json!({"name": "A"}))))
            .await
            .unwrap();
        adapter
            .put(Collection::Sectors, Document::new("1", fields(json!({"name": "B"}))))
            .await
            .unwrap();

        let docs = adapter.load(Collection::Sectors).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields["name"], json!("B"));
    }

    /// Key-value store whose first write is slow.
    struct SlowFirstWrite {
        inner: MemoryKeyValueStore,
        writes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for SlowFirstWrite {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<()> {
            let n = self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_writes_publish_in_order() {
        let store: Arc<dyn KeyValueStore> = Arc::new(SlowFirstWrite {
            inner: MemoryKeyValueStore::new(),
            writes: Default::default(),
        });
        let adapter = Arc::new(MemoryAdapter::with_snapshot(store.clone()).await.unwrap());

        let pushes: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = pushes.clone();
        let _subscription = adapter
            .subscribe(
                Collection::Sectors,
                Arc::new(move |_, docs| sink.lock().unwrap().push(docs.len())),
            )
            .await
            .unwrap();

        let first = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                adapter
                    .create(Collection::Sectors, fields(json!({"name": "A"})))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                adapter
                    .create(Collection::Sectors, fields(json!({"name": "B"})))
                    .await
            })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let persisted: Vec<Document> = get_json(store.as_ref(), SECTORS_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(*pushes.lock().unwrap(), vec![0, 1, 2]);
    }
}
