//! Read-side queries used by the views.

use serde::Serialize;
use tutoria_core::Collection;
use tutoria_core::sector::Sector;
use tutoria_core::tutorial::Tutorial;
use tutoria_core::user::{Role, User};

use super::EntityStore;

/// Counts shown on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub sectors: usize,
    pub tutorials: usize,
    pub regular_users: usize,
}

impl EntityStore {
    pub async fn sectors(&self) -> Vec<Sector> {
        self.state.read().await.sectors.clone()
    }

    pub async fn tutorials(&self) -> Vec<Tutorial> {
        self.state.read().await.tutorials.clone()
    }

    pub async fn users(&self) -> Vec<User> {
        self.state.read().await.users.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.session.current().await
    }

    pub async fn revision(&self, collection: Collection) -> u64 {
        self.state.read().await.revision(collection)
    }

    /// Tutorials of the session user's sector matching `search` on title or
    /// description. Empty without a session or when the user has no sector.
    pub async fn tutorials_for_current_user(&self, search: &str) -> Vec<Tutorial> {
        let Some(sector_id) = self.session.current().await.and_then(|u| u.sector_id) else {
            return Vec::new();
        };
        self.state
            .read()
            .await
            .tutorials
            .iter()
            .filter(|t| t.sector_id == sector_id && t.matches_query(search))
            .cloned()
            .collect()
    }

    /// Tutorials whose id is in the session user's viewed set. Stale ids are
    /// skipped.
    pub async fn viewed_tutorials(&self) -> Vec<Tutorial> {
        let Some(user) = self.session.current().await else {
            return Vec::new();
        };
        self.state
            .read()
            .await
            .tutorials
            .iter()
            .filter(|t| user.has_viewed(&t.id))
            .cloned()
            .collect()
    }

    pub async fn tutorial_count_for_sector(&self, sector_id: &str) -> usize {
        self.state
            .read()
            .await
            .tutorials
            .iter()
            .filter(|t| t.sector_id == sector_id)
            .count()
    }

    pub async fn regular_users(&self) -> Vec<User> {
        self.state
            .read()
            .await
            .users
            .iter()
            .filter(|u| u.role == Role::User)
            .cloned()
            .collect()
    }

    pub async fn dashboard_stats(&self) -> DashboardStats {
        let state = self.state.read().await;
        DashboardStats {
            sectors: state.sectors.len(),
            tutorials: state.tutorials.len(),
            regular_users: state.users.iter().filter(|u| u.role == Role::User).count(),
        }
    }
}
