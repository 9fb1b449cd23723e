//! Listener bookkeeping shared by the adapters that push change notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tutoria_core::{ChangeHandler, Collection, Document, Subscription};

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, (Collection, ChangeHandler)>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a listener and returns a subscription that removes it again.
    pub fn register(self: &Arc<Self>, collection: Collection, handler: ChangeHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, (collection, handler));

        let registry = Arc::downgrade(self);
        Subscription::new(collection, move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().remove(&id);
            }
        })
    }

    /// Delivers `documents` to every listener of `collection`.
    ///
    /// Handlers run outside the registry lock.
    pub fn notify(&self, collection: Collection, documents: &[Document]) {
        let handlers: Vec<ChangeHandler> = self
            .lock()
            .values()
            .filter(|(c, _)| *c == collection)
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(collection, documents.to_vec());
        }
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.lock().values().filter(|(c, _)| *c == collection).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, (Collection, ChangeHandler)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_reaches_only_matching_collection() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let _sectors = registry.register(
            Collection::Sectors,
            Arc::new(move |_, docs| {
                counter.fetch_add(docs.len(), Ordering::SeqCst);
            }),
        );

        registry.notify(Collection::Tutorials, &[Document::new("t1", Default::default())]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        registry.notify(Collection::Sectors, &[Document::new("1", Default::default())]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let registry = ListenerRegistry::new();
        let subscription = registry.register(Collection::Users, Arc::new(|_, _| {}));
        assert_eq!(registry.count(Collection::Users), 1);

        subscription.unsubscribe();
        assert_eq!(registry.count(Collection::Users), 0);
    }
}
