use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Access level of an account. Fixed at creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// An account as stored in the users collection and in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Salted credential hash (`sha256$salt$digest`), or a legacy plaintext value.
    pub password: String,
    pub role: Role,
    /// `None` for admins. Regular users see no tutorials without a sector.
    #[serde(default)]
    pub sector_id: Option<String>,
    /// Ids of tutorials this user opened. Grows monotonically, no duplicates.
    #[serde(default)]
    pub viewed_tutorials: Vec<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_viewed(&self, tutorial_id: &str) -> bool {
        self.viewed_tutorials.iter().any(|id| id == tutorial_id)
    }

    /// Records a viewed tutorial. Returns `false` if it was already present.
    pub fn mark_viewed(&mut self, tutorial_id: &str) -> bool {
        if self.has_viewed(tutorial_id) {
            return false;
        }
        self.viewed_tutorials.push(tutorial_id.to_string());
        true
    }

    pub fn email_matches(&self, email: &str) -> bool {
        self.email.to_lowercase() == email.to_lowercase()
    }
}

/// Request to create a user. `password` is plaintext and hashed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub sector_id: Option<String>,
}

/// Partial update of a user. `role` is intentionally absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Plaintext on input; the store replaces it with a hash before persisting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// `Some(None)` clears the sector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed_tutorials: Option<Vec<String>>,
}

impl UserPatch {
    /// Applies the patch in place.
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(password) = &self.password {
            user.password = password.clone();
        }
        if let Some(sector_id) = &self.sector_id {
            user.sector_id = sector_id.clone();
        }
        if let Some(viewed) = &self.viewed_tutorials {
            user.viewed_tutorials = viewed.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> User {
        User {
            id: "user1".to_string(),
            name: "João Silva".to_string(),
            email: "joao@empresa.com".to_string(),
            password: "123456".to_string(),
            role: Role::User,
            sector_id: Some("1".to_string()),
            viewed_tutorials: Vec::new(),
        }
    }

    #[test]
    fn test_mark_viewed_is_idempotent() {
        let mut user = user();
        assert!(user.mark_viewed("t1"));
        assert!(!user.mark_viewed("t1"));
        assert_eq!(user.viewed_tutorials, vec!["t1".to_string()]);
    }

    #[test]
    fn test_email_match_ignores_case() {
        assert!(user().email_matches("JOAO@Empresa.com"));
        assert!(!user().email_matches("maria@empresa.com"));
    }

    #[test]
    fn test_missing_viewed_tutorials_defaults_to_empty() {
        let user: User = serde_json::from_value(json!({
            "id": "admin",
            "name": "Administrador",
            "email": "admin@empresa.com",
            "password": "123456",
            "role": "admin",
            "sectorId": null
        }))
        .unwrap();
        assert!(user.is_admin());
        assert!(user.viewed_tutorials.is_empty());
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = UserPatch {
            name: Some("Maria".to_string()),
            sector_id: Some(None),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({"name": "Maria", "sectorId": null}));
    }

    #[test]
    fn test_patch_apply_clears_sector() {
        let mut user = user();
        UserPatch {
            sector_id: Some(None),
            ..Default::default()
        }
        .apply_to(&mut user);
        assert!(user.sector_id.is_none());
        assert_eq!(user.name, "João Silva");
    }
}
