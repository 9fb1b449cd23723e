//! Entity store: the single source of truth for sectors, tutorials, users and
//! the session.
//!
//! Every mutation is optimistic. The in-memory state is changed under the
//! write lock, the lock is released, and only then is the adapter asked to
//! make the same change durable. A failed durable write is logged at `WARN`
//! and the local change stays; nothing is rolled back or retried.
//!
//! Backend pushes never touch the state directly. Subscription handlers
//! enqueue [`StoreEvent`]s that [`EntityStore::sync`] (or the loop started by
//! [`EntityStore::spawn_sync_loop`]) applies as full-collection replaces.

mod event;
mod queries;
mod state;

pub use event::StoreEvent;
pub use queries::DashboardStats;
pub use state::StoreState;

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tutoria_core::config::{AppConfig, UserDurability};
use tutoria_core::document::{entities_from_documents, to_fields};
use tutoria_core::kv::{KeyValueStore, USERS_KEY, get_json, set_json};
use tutoria_core::sector::{SECTOR_NOT_FOUND, Sector};
use tutoria_core::seed;
use tutoria_core::tutorial::{NewTutorial, Tutorial, TutorialPatch};
use tutoria_core::user::{NewUser, User, UserPatch, hash_password};
use tutoria_core::{ChangeHandler, Collection, Document, PersistenceAdapter, Subscription};

use crate::auth::{SessionGate, authenticate};

/// Construction-time behavior of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub users: UserDurability,
}

impl StoreOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            users: config.users,
        }
    }
}

pub struct EntityStore {
    state: RwLock<StoreState>,
    adapter: Arc<dyn PersistenceAdapter>,
    kv: Arc<dyn KeyValueStore>,
    session: SessionGate,
    options: StoreOptions,
    events_tx: Mutex<Option<UnboundedSender<StoreEvent>>>,
    events_rx: tokio::sync::Mutex<Option<UnboundedReceiver<StoreEvent>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EntityStore {
    pub fn new(
        adapter: Arc<dyn PersistenceAdapter>,
        kv: Arc<dyn KeyValueStore>,
        options: StoreOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: RwLock::new(StoreState::default()),
            session: SessionGate::new(kv.clone()),
            adapter,
            kv,
            options,
            events_tx: Mutex::new(Some(tx)),
            events_rx: tokio::sync::Mutex::new(Some(rx)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.adapter
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    fn users_are_durable(&self) -> bool {
        self.options.users == UserDurability::Durable
    }

    /// Collections whose contents live in the persistence adapter.
    fn durable_collections(&self) -> Vec<Collection> {
        Collection::ALL
            .into_iter()
            .filter(|c| *c != Collection::Users || self.users_are_durable())
            .collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Attaches the store to its backends.
    ///
    /// Live backends get one subscription per durable collection; the others
    /// are loaded once. Local-only users are read from the key-value store.
    /// Failures are logged and the affected collection keeps its local state.
    pub async fn connect(&self) {
        if !self.users_are_durable() {
            self.load_local_users().await;
        }

        let live = self.adapter.supports_live_updates();
        tracing::info!(
            "[EntityStore] Connecting to {} backend (live updates: {})",
            self.adapter.kind(),
            live
        );

        for collection in self.durable_collections() {
            if live {
                self.subscribe(collection).await;
            } else {
                match self.adapter.load(collection).await {
                    Ok(documents) => self.apply_snapshot(collection, documents).await,
                    Err(e) => {
                        tracing::warn!("[EntityStore] Failed to load {}: {}", collection, e)
                    }
                }
            }
        }

        self.sync().await;
    }

    async fn subscribe(&self, collection: Collection) {
        let Some(tx) = lock(&self.events_tx).clone() else {
            tracing::debug!("[EntityStore] Store shut down, not subscribing to {}", collection);
            return;
        };
        let handler: ChangeHandler = Arc::new(move |collection, documents| {
            let _ = tx.send(StoreEvent::Snapshot {
                collection,
                documents,
            });
        });
        match self.adapter.subscribe(collection, handler).await {
            Ok(subscription) => lock(&self.subscriptions).push(subscription),
            Err(e) => {
                tracing::warn!("[EntityStore] Failed to subscribe to {}: {}", collection, e)
            }
        }
    }

    async fn load_local_users(&self) {
        match get_json::<Vec<User>>(self.kv.as_ref(), USERS_KEY).await {
            Ok(Some(users)) => {
                let mut state = self.state.write().await;
                state.users = users;
                state.bump(Collection::Users);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("[EntityStore] Failed to read local users: {}", e),
        }
    }

    /// Inserts the default dataset into every empty backing collection.
    ///
    /// Run before [`connect`](Self::connect). Returns the number of
    /// collections that were seeded.
    pub async fn seed_defaults(&self) -> usize {
        let mut seeded = 0;
        for collection in self.durable_collections() {
            let existing = match self.adapter.load(collection).await {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::warn!("[EntityStore] Skipping seed of {}: {}", collection, e);
                    continue;
                }
            };
            if !existing.is_empty() {
                continue;
            }
            let documents = match collection {
                Collection::Sectors => documents_of(&seed::default_sectors()),
                Collection::Tutorials => documents_of(&seed::default_tutorials()),
                Collection::Users => documents_of(&seed::default_users()),
            };
            let documents = match documents {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::warn!("[EntityStore] Failed to build {} seed: {}", collection, e);
                    continue;
                }
            };
            let mut complete = true;
            for document in documents {
                if let Err(e) = self.adapter.put(collection, document).await {
                    tracing::warn!("[EntityStore] Failed to seed {}: {}", collection, e);
                    complete = false;
                    break;
                }
            }
            if complete {
                tracing::info!("[EntityStore] Seeded default {}", collection);
                seeded += 1;
            }
        }

        if !self.users_are_durable() {
            match self.kv.get(USERS_KEY).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    match set_json(self.kv.as_ref(), USERS_KEY, &seed::default_users()).await {
                        Ok(()) => {
                            tracing::info!("[EntityStore] Seeded default local users");
                            seeded += 1;
                        }
                        Err(e) => {
                            tracing::warn!("[EntityStore] Failed to seed local users: {}", e)
                        }
                    }
                }
                Err(e) => tracing::warn!("[EntityStore] Failed to read local users: {}", e),
            }
        }

        seeded
    }

    /// Applies every queued event in arrival order. Returns how many were
    /// applied. Does nothing while a sync loop owns the queue.
    pub async fn sync(&self) -> usize {
        let mut guard = self.events_rx.lock().await;
        let Some(rx) = guard.as_mut() else {
            return 0;
        };
        let mut applied = 0;
        while let Ok(event) = rx.try_recv() {
            self.apply_event(event).await;
            applied += 1;
        }
        applied
    }

    /// Moves the event queue into a background task that applies events as
    /// they arrive. The task ends after [`shutdown`](Self::shutdown) or when
    /// the store is dropped.
    ///
    /// Returns `None` if the queue was already handed to a loop.
    pub async fn spawn_sync_loop(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.events_rx.lock().await.take()?;
        let store = Arc::downgrade(self);
        let handle: JoinHandle<()> = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.apply_event(event).await;
            }
            tracing::debug!("[EntityStore] Sync loop stopped");
        });
        Some(handle)
    }

    /// Detaches every subscription and closes the event queue.
    pub fn shutdown(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        lock(&self.events_tx).take();
        tracing::info!("[EntityStore] Shut down ({} subscriptions released)", count);
    }

    async fn apply_event(&self, event: StoreEvent) {
        match event {
            StoreEvent::Snapshot {
                collection,
                documents,
            } => self.apply_snapshot(collection, documents).await,
        }
    }

    async fn apply_snapshot(&self, collection: Collection, documents: Vec<Document>) {
        let count = documents.len();
        let mut state = self.state.write().await;
        let rejected = match collection {
            Collection::Sectors => replace(&mut state.sectors, documents),
            Collection::Tutorials => replace(&mut state.tutorials, documents),
            Collection::Users => replace(&mut state.users, documents),
        };
        let revision = state.bump(collection);
        let session_record = match (collection, self.session.current().await) {
            (Collection::Users, Some(current)) => state
                .users
                .iter()
                .find(|u| u.id == current.id && **u != current)
                .cloned(),
            _ => None,
        };
        drop(state);

        if let Some(record) = session_record {
            self.session.refresh(&record).await;
            tracing::debug!("[EntityStore] Session copy of '{}' refreshed from backend", record.id);
        }

        if !rejected.is_empty() {
            tracing::warn!(
                "[EntityStore] Skipped malformed {} records: {:?}",
                collection,
                rejected
            );
        }
        tracing::debug!(
            "[EntityStore] Applied {} snapshot ({} records, revision {})",
            collection,
            count - rejected.len(),
            revision
        );
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Restores a persisted session.
    pub async fn restore_session(&self) -> Option<User> {
        self.session.restore().await
    }

    /// Authenticates against the loaded users. A mismatch has no side
    /// effects.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        let user = {
            let state = self.state.read().await;
            authenticate(&state.users, email, password).cloned()
        };
        match user {
            Some(user) => {
                tracing::info!("[EntityStore] '{}' logged in", user.id);
                self.session.set(user).await;
                true
            }
            None => {
                tracing::debug!("[EntityStore] Login rejected for '{}'", email);
                false
            }
        }
    }

    pub async fn logout(&self) {
        self.session.clear().await;
    }

    // ------------------------------------------------------------------
    // Sectors
    // ------------------------------------------------------------------

    pub async fn add_sector(&self, name: &str) -> Sector {
        let mut sector = {
            let mut state = self.state.write().await;
            let sector = Sector::new(state.local_id(Collection::Sectors), name);
            state.sectors.push(sector.clone());
            state.bump(Collection::Sectors);
            sector
        };
        if let Some(id) = self.durable_create(Collection::Sectors, &sector).await {
            sector.id = id;
        }
        sector
    }

    pub async fn delete_sector(&self, id: &str) {
        {
            let mut state = self.state.write().await;
            state.sectors.retain(|s| s.id != id);
            state.bump(Collection::Sectors);
        }
        self.durable_delete(Collection::Sectors, id).await;
    }

    /// Name of the sector, or `"sector not found"` if it does not exist.
    pub async fn get_sector_name(&self, sector_id: &str) -> String {
        self.state
            .read()
            .await
            .sectors
            .iter()
            .find(|s| s.id == sector_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| SECTOR_NOT_FOUND.to_string())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn add_user(&self, new_user: NewUser) -> User {
        let mut user = {
            let mut state = self.state.write().await;
            let user = User {
                id: state.local_id(Collection::Users),
                name: new_user.name,
                email: new_user.email,
                password: hash_password(&new_user.password),
                role: new_user.role,
                sector_id: new_user.sector_id,
                viewed_tutorials: Vec::new(),
            };
            state.users.push(user.clone());
            state.bump(Collection::Users);
            user
        };

        if self.users_are_durable() {
            if let Some(id) = self.durable_create(Collection::Users, &user).await {
                user.id = id;
            }
        } else {
            self.save_local_users().await;
        }
        user
    }

    /// Merges `patch` into the user. A password in the patch is hashed first.
    pub async fn update_user(&self, id: &str, mut patch: UserPatch) {
        if let Some(password) = patch.password.take() {
            patch.password = Some(hash_password(&password));
        }

        let updated = {
            let mut state = self.state.write().await;
            let updated = state.users.iter_mut().find(|u| u.id == id).map(|user| {
                patch.apply_to(user);
                user.clone()
            });
            state.bump(Collection::Users);
            updated
        };

        match &updated {
            Some(user) => {
                if self.session.refresh(user).await {
                    tracing::debug!("[EntityStore] Refreshed session copy of '{}'", id);
                }
            }
            None => tracing::debug!("[EntityStore] Updating user '{}' not held locally", id),
        }

        self.persist_user_patch(id, &patch).await;
    }

    pub async fn delete_user(&self, id: &str) {
        {
            let mut state = self.state.write().await;
            state.users.retain(|u| u.id != id);
            state.bump(Collection::Users);
        }
        if self.users_are_durable() {
            self.durable_delete(Collection::Users, id).await;
        } else {
            self.save_local_users().await;
        }
    }

    async fn persist_user_patch(&self, id: &str, patch: &UserPatch) {
        if self.users_are_durable() {
            self.durable_update(Collection::Users, id, patch).await;
        } else {
            self.save_local_users().await;
        }
    }

    async fn save_local_users(&self) {
        let users = self.state.read().await.users.clone();
        if let Err(e) = set_json(self.kv.as_ref(), USERS_KEY, &users).await {
            tracing::warn!("[EntityStore] Failed to persist local users: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Tutorials
    // ------------------------------------------------------------------

    /// Creates a tutorial authored by the session user.
    ///
    /// Returns `None` without touching anything when no session is active.
    pub async fn add_tutorial(&self, new_tutorial: NewTutorial) -> Option<Tutorial> {
        let Some(author) = self.session.current().await else {
            tracing::debug!("[EntityStore] add_tutorial ignored: no active session");
            return None;
        };

        let mut tutorial = {
            let mut state = self.state.write().await;
            let tutorial = Tutorial {
                id: state.local_id(Collection::Tutorials),
                title: new_tutorial.title,
                description: new_tutorial.description,
                images: new_tutorial.images,
                audio_url: new_tutorial.audio_url,
                sector_id: new_tutorial.sector_id,
                created_by: author.id,
                created_at: Utc::now(),
            };
            state.tutorials.push(tutorial.clone());
            state.bump(Collection::Tutorials);
            tutorial
        };

        if let Some(id) = self.durable_create(Collection::Tutorials, &tutorial).await {
            tutorial.id = id;
        }
        Some(tutorial)
    }

    pub async fn update_tutorial(&self, id: &str, patch: TutorialPatch) {
        {
            let mut state = self.state.write().await;
            if let Some(tutorial) = state.tutorials.iter_mut().find(|t| t.id == id) {
                patch.apply_to(tutorial);
            }
            state.bump(Collection::Tutorials);
        }
        self.durable_update(Collection::Tutorials, id, &patch).await;
    }

    pub async fn delete_tutorial(&self, id: &str) {
        {
            let mut state = self.state.write().await;
            state.tutorials.retain(|t| t.id != id);
            state.bump(Collection::Tutorials);
        }
        self.durable_delete(Collection::Tutorials, id).await;
    }

    /// Records that the session user opened `tutorial_id`.
    ///
    /// No-op without a session, for unknown tutorials, and for tutorials
    /// already marked.
    pub async fn mark_tutorial_as_viewed(&self, tutorial_id: &str) {
        let Some(session_user) = self.session.current().await else {
            tracing::debug!("[EntityStore] mark_tutorial_as_viewed ignored: no active session");
            return;
        };

        // The collection entry may hold marks the session copy has not seen yet,
        // so the persisted list is the union of both plus the new id.
        let viewed = {
            let mut state = self.state.write().await;
            if !state.contains_id(Collection::Tutorials, tutorial_id) {
                tracing::debug!("[EntityStore] Unknown tutorial '{}' not marked", tutorial_id);
                return;
            }
            let entry = state.users.iter_mut().find(|u| u.id == session_user.id);
            let entry_has_it = entry.as_ref().is_some_and(|u| u.has_viewed(tutorial_id));
            if entry_has_it && session_user.has_viewed(tutorial_id) {
                return;
            }

            let mut merged = User {
                viewed_tutorials: entry
                    .as_ref()
                    .map(|u| u.viewed_tutorials.clone())
                    .unwrap_or_default(),
                ..session_user.clone()
            };
            for id in &session_user.viewed_tutorials {
                merged.mark_viewed(id);
            }
            merged.mark_viewed(tutorial_id);

            if let Some(entry) = entry {
                entry.viewed_tutorials = merged.viewed_tutorials.clone();
            }
            state.bump(Collection::Users);
            merged.viewed_tutorials
        };

        let session_view = viewed.clone();
        if self
            .session
            .modify(move |u| u.viewed_tutorials = session_view)
            .await
            .is_none()
        {
            return;
        }

        let patch = UserPatch {
            viewed_tutorials: Some(viewed),
            ..Default::default()
        };
        self.persist_user_patch(&session_user.id, &patch).await;
    }

    // ------------------------------------------------------------------
    // Durable writes
    // ------------------------------------------------------------------

    /// Creates the record in the backend and re-keys the local copy to the
    /// backend's id. Returns that id, or `None` if the local id stands.
    async fn durable_create<T: Serialize>(
        &self,
        collection: Collection,
        entity: &T,
    ) -> Option<String> {
        let document = match Document::from_entity(entity) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    "[EntityStore] Cannot serialize new {}: {}",
                    collection.entity_type(),
                    e
                );
                return None;
            }
        };
        let local_id = document.id;
        match self.adapter.create(collection, document.fields).await {
            Ok(id) => {
                self.state.write().await.rekey(collection, &local_id, &id);
                tracing::debug!(
                    "[EntityStore] Created {} '{}' (local '{}')",
                    collection.entity_type(),
                    id,
                    local_id
                );
                Some(id)
            }
            Err(e) => {
                tracing::warn!(
                    "[EntityStore] Keeping {} '{}' in memory only: {}",
                    collection.entity_type(),
                    local_id,
                    e
                );
                None
            }
        }
    }

    async fn durable_update<P: Serialize>(&self, collection: Collection, id: &str, patch: &P) {
        let partial = match to_fields(patch) {
            Ok(partial) => partial,
            Err(e) => {
                tracing::warn!(
                    "[EntityStore] Cannot serialize {} patch: {}",
                    collection.entity_type(),
                    e
                );
                return;
            }
        };
        if partial.is_empty() {
            return;
        }
        if let Err(e) = self.adapter.update(collection, id, partial).await {
            tracing::warn!(
                "[EntityStore] Update of {} '{}' kept in memory only: {}",
                collection.entity_type(),
                id,
                e
            );
        }
    }

    async fn durable_delete(&self, collection: Collection, id: &str) {
        if let Err(e) = self.adapter.delete(collection, id).await {
            tracing::warn!(
                "[EntityStore] Deletion of {} '{}' kept in memory only: {}",
                collection.entity_type(),
                id,
                e
            );
        }
    }
}

fn documents_of<T: Serialize>(entities: &[T]) -> tutoria_core::Result<Vec<Document>> {
    entities.iter().map(Document::from_entity).collect()
}

fn replace<T: DeserializeOwned>(target: &mut Vec<T>, documents: Vec<Document>) -> Vec<String> {
    let (entities, rejected) = entities_from_documents(documents);
    *target = entities;
    rejected
}
