use chrono::Utc;
use tutoria_core::Collection;
use tutoria_core::sector::Sector;
use tutoria_core::tutorial::Tutorial;
use tutoria_core::user::User;

/// In-memory copy of the three collections.
///
/// Every local mutation and every applied snapshot bumps the collection's
/// revision. Revisions only ever grow; they are not compared against remote
/// data.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub sectors: Vec<Sector>,
    pub tutorials: Vec<Tutorial>,
    pub users: Vec<User>,
    revisions: [u64; 3],
}

fn slot(collection: Collection) -> usize {
    match collection {
        Collection::Sectors => 0,
        Collection::Tutorials => 1,
        Collection::Users => 2,
    }
}

impl StoreState {
    pub fn revision(&self, collection: Collection) -> u64 {
        self.revisions[slot(collection)]
    }

    pub fn bump(&mut self, collection: Collection) -> u64 {
        let revision = &mut self.revisions[slot(collection)];
        *revision += 1;
        *revision
    }

    pub fn contains_id(&self, collection: Collection, id: &str) -> bool {
        match collection {
            Collection::Sectors => self.sectors.iter().any(|s| s.id == id),
            Collection::Tutorials => self.tutorials.iter().any(|t| t.id == id),
            Collection::Users => self.users.iter().any(|u| u.id == id),
        }
    }

    /// Time-derived id for records created before (or without) the backend.
    ///
    /// Milliseconds since the epoch, bumped until unused in `collection`.
    pub fn local_id(&self, collection: Collection) -> String {
        let mut candidate = Utc::now().timestamp_millis();
        while self.contains_id(collection, &candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }

    /// Replaces a record's id after the backend assigned its own.
    pub fn rekey(&mut self, collection: Collection, from: &str, to: &str) -> bool {
        if from == to || self.contains_id(collection, to) {
            return false;
        }
        let renamed = match collection {
            Collection::Sectors => rename(self.sectors.iter_mut().map(|s| &mut s.id), from, to),
            Collection::Tutorials => {
                rename(self.tutorials.iter_mut().map(|t| &mut t.id), from, to)
            }
            Collection::Users => rename(self.users.iter_mut().map(|u| &mut u.id), from, to),
        };
        if renamed {
            self.bump(collection);
        }
        renamed
    }
}

fn rename<'a>(mut ids: impl Iterator<Item = &'a mut String>, from: &str, to: &str) -> bool {
    match ids.find(|id| id.as_str() == from) {
        Some(id) => {
            *id = to.to_string();
            true
        }
        None => false,
    }
}
