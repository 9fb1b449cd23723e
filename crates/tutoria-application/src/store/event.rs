use tutoria_core::{Collection, Document};

/// An entry on the store's event queue.
///
/// Subscription callbacks never touch store state; they enqueue one of these
/// and the applier replays them in arrival order.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Full contents of a collection as reported by the backend.
    Snapshot {
        collection: Collection,
        documents: Vec<Document>,
    },
}
