use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on description length, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

/// An ordered image sequence with title and description, owned by one sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tutorial {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Image references: URLs or embedded data URIs, in display order.
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub sector_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Tutorial {
    /// Case-insensitive match against title or description.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }
}

/// Request to create a tutorial. Author and timestamp are stamped by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTutorial {
    pub title: String,
    pub description: String,
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub sector_id: String,
}

/// Partial update of a tutorial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorialPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_id: Option<String>,
}

impl TutorialPatch {
    pub fn apply_to(&self, tutorial: &mut Tutorial) {
        if let Some(title) = &self.title {
            tutorial.title = title.clone();
        }
        if let Some(description) = &self.description {
            tutorial.description = description.clone();
        }
        if let Some(images) = &self.images {
            tutorial.images = images.clone();
        }
        if let Some(audio_url) = &self.audio_url {
            tutorial.audio_url = audio_url.clone();
        }
        if let Some(sector_id) = &self.sector_id {
            tutorial.sector_id = sector_id.clone();
        }
    }
}
