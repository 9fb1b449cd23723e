//! Local embedded table store.
//!
//! Directory structure:
//! ```text
//! tables/
//! ├── sectors.json
//! ├── tutorials.json
//! └── users.json
//! ```
//!
//! Each file holds one table. There is no change notification, so the entity
//! store loads every collection once at startup.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tutoria_core::{
    BackendKind, Collection, Document, Fields, PersistenceAdapter, Result, TutoriaError,
};
use uuid::Uuid;

use crate::storage::AtomicJsonFile;

const TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableFile {
    version: u32,
    #[serde(default)]
    records: Vec<Document>,
}

impl Default for TableFile {
    fn default() -> Self {
        Self {
            version: TABLE_VERSION,
            records: Vec::new(),
        }
    }
}

pub struct TableStoreAdapter {
    dir: PathBuf,
}

impl TableStoreAdapter {
    /// Opens (and creates if needed) the table directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            TutoriaError::io(format!("Failed to create table directory {:?}: {}", dir, e))
        })?;
        tracing::info!("[TableStore] Using table directory {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table(&self, collection: Collection) -> AtomicJsonFile<TableFile> {
        AtomicJsonFile::new(self.dir.join(format!("{}.json", collection)))
    }

    /// Runs a read-modify-write cycle on one table in the blocking pool.
    async fn modify<F, R>(&self, collection: Collection, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<Document>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let file = self.table(collection);
        tokio::task::spawn_blocking(move || {
            file.update(TableFile::default(), |table| f(&mut table.records))
        })
        .await
        .map_err(|e| TutoriaError::internal(format!("Failed to join task: {}", e)))?
    }
}

#[async_trait]
impl PersistenceAdapter for TableStoreAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalTable
    }

    fn supports_live_updates(&self) -> bool {
        false
    }

    async fn load(&self, collection: Collection) -> Result<Vec<Document>> {
        let file = self.table(collection);
        let table = tokio::task::spawn_blocking(move || file.load())
            .await
            .map_err(|e| TutoriaError::internal(format!("Failed to join task: {}", e)))??;
        Ok(table.map(|t| t.records).unwrap_or_default())
    }

    async fn create(&self, collection: Collection, fields: Fields) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let document = Document::new(id.clone(), fields);
        self.modify(collection, move |records| {
            records.push(document);
            Ok(())
        })
        .await?;
        tracing::debug!("[TableStore] Created {} '{}'", collection.entity_type(), id);
        Ok(id)
    }

    async fn put(&self, collection: Collection, document: Document) -> Result<()> {
        self.modify(collection, move |records| {
            match records.iter_mut().find(|d| d.id == document.id) {
                Some(existing) => *existing = document,
                None => records.push(document),
            }
            Ok(())
        })
        .await
    }

    async fn update(&self, collection: Collection, id: &str, partial: Fields) -> Result<()> {
        let id = id.to_string();
        self.modify(collection, move |records| {
            let document = records
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| TutoriaError::not_found(collection.entity_type(), id.clone()))?;
            document.merge(&partial);
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let id = id.to_string();
        self.modify(collection, move |records| {
            records.retain(|d| d.id != id);
            Ok(())
        })
        .await
    }
}
