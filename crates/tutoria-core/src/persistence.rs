//! Persistence adapter trait.
//!
//! Defines the contract every backing store implements, decoupling the entity
//! store from the specific storage mechanism (in-process tables, local table
//! files, a remote document service).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::document::{Collection, Document, Fields};
use crate::error::{Result, TutoriaError};

/// Callback receiving the full current contents of a collection.
pub type ChangeHandler = Arc<dyn Fn(Collection, Vec<Document>) + Send + Sync>;

/// Which backing store an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    Memory,
    LocalTable,
    Remote,
}

/// Handle for a live subscription.
///
/// Call [`Subscription::unsubscribe`] on teardown. Dropping the handle detaches
/// the listener as well.
pub struct Subscription {
    collection: Collection,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(collection: Collection, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            collection,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Durable CRUD over the three collections, with optional live updates.
///
/// # Implementation Notes
///
/// - `create` assigns the id; `put` stores a caller-chosen id.
/// - `update` shallow-merges and fails with `NotFound` for unknown ids.
/// - `delete` of an unknown id succeeds.
/// - Unreachable stores fail with `BackendUnavailable`.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether `subscribe` is available. When false, the store loads each
    /// collection once at startup instead.
    fn supports_live_updates(&self) -> bool;

    /// Registers `on_change` for `collection`.
    ///
    /// The handler receives the full collection once right away and again
    /// after every change, including changes made through this adapter.
    async fn subscribe(&self, collection: Collection, on_change: ChangeHandler)
    -> Result<Subscription> {
        let _ = on_change;
        Err(TutoriaError::unsupported(format!(
            "{} backend has no live updates for {}",
            self.kind(),
            collection
        )))
    }

    /// Reads the full collection.
    async fn load(&self, collection: Collection) -> Result<Vec<Document>>;

    /// Inserts a record and returns the id assigned by the store.
    async fn create(&self, collection: Collection, fields: Fields) -> Result<String>;

    /// Inserts or replaces a record under a caller-chosen id.
    async fn put(&self, collection: Collection, document: Document) -> Result<()>;

    /// Merges `partial` into an existing record.
    async fn update(&self, collection: Collection, id: &str, partial: Fields) -> Result<()>;

    /// Removes a record.
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unsubscribe_runs_cancel_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(Collection::Sectors, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(subscription.collection(), Collection::Sectors);

        subscription.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _subscription = Subscription::new(Collection::Users, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::LocalTable.to_string(), "local_table");
    }
}
