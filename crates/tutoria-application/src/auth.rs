//! Session/auth gate.
//!
//! Holds the active session user and mirrors it into the key-value store
//! under `currentUser`. Persistence failures are logged and never fail the
//! caller: the in-memory session is authoritative for the running process.

use std::sync::Arc;

use tokio::sync::RwLock;
use tutoria_core::kv::{CURRENT_USER_KEY, KeyValueStore, get_json, set_json};
use tutoria_core::user::{User, verify_password};
use tutoria_core::validation::validate_login;

/// The current authenticated user, shared by the entity store.
pub struct SessionGate {
    current: RwLock<Option<User>>,
    kv: Arc<dyn KeyValueStore>,
}

impl SessionGate {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            current: RwLock::new(None),
            kv,
        }
    }

    /// Loads a persisted session, if any, and treats it as active.
    ///
    /// The stored user is not re-validated against the users collection.
    /// An unreadable entry is discarded.
    pub async fn restore(&self) -> Option<User> {
        match get_json::<User>(self.kv.as_ref(), CURRENT_USER_KEY).await {
            Ok(Some(user)) => {
                tracing::info!("[Session] Restored session for '{}'", user.id);
                *self.current.write().await = Some(user.clone());
                Some(user)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("[Session] Discarding unreadable session: {}", e);
                if let Err(e) = self.kv.remove(CURRENT_USER_KEY).await {
                    tracing::warn!("[Session] Failed to remove session key: {}", e);
                }
                None
            }
        }
    }

    pub async fn current(&self) -> Option<User> {
        self.current.read().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Makes `user` the session user and persists it.
    pub async fn set(&self, user: User) {
        *self.current.write().await = Some(user.clone());
        self.persist(&user).await;
    }

    /// Replaces the session copy if `user` is the session user.
    ///
    /// Returns `true` when the session was refreshed.
    pub async fn refresh(&self, user: &User) -> bool {
        {
            let mut current = self.current.write().await;
            match current.as_mut() {
                Some(active) if active.id == user.id => *active = user.clone(),
                _ => return false,
            }
        }
        self.persist(user).await;
        true
    }

    /// Applies `f` to the session user and persists the result.
    ///
    /// Returns the updated user, or `None` when no session is active.
    pub async fn modify<F, R>(&self, f: F) -> Option<(User, R)>
    where
        F: FnOnce(&mut User) -> R,
    {
        let (user, result) = {
            let mut current = self.current.write().await;
            let user = current.as_mut()?;
            let result = f(user);
            (user.clone(), result)
        };
        self.persist(&user).await;
        Some((user, result))
    }

    /// Ends the session and removes the persisted trace.
    pub async fn clear(&self) {
        let previous = self.current.write().await.take();
        if let Err(e) = self.kv.remove(CURRENT_USER_KEY).await {
            tracing::warn!("[Session] Failed to remove session key: {}", e);
        }
        if let Some(user) = previous {
            tracing::info!("[Session] Logged out '{}'", user.id);
        }
    }

    async fn persist(&self, user: &User) {
        if let Err(e) = set_json(self.kv.as_ref(), CURRENT_USER_KEY, user).await {
            tracing::warn!("[Session] Failed to persist session for '{}': {}", user.id, e);
        }
    }
}

/// Finds the user whose email matches case-insensitively and whose stored
/// credential accepts `password`.
pub fn authenticate<'a>(users: &'a [User], email: &str, password: &str) -> Option<&'a User> {
    let (email, password) = match validate_login(email, password) {
        Ok(credentials) => credentials,
        Err(_) => return None,
    };
    users
        .iter()
        .find(|user| user.email_matches(&email))
        .filter(|user| verify_password(&password, &user.password))
}
