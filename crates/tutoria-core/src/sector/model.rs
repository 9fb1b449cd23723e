use serde::{Deserialize, Serialize};

/// Display name returned for sector ids that no longer resolve.
///
/// Sector deletion does not cascade, so tutorials and users may keep pointing
/// at a removed sector.
pub const SECTOR_NOT_FOUND: &str = "sector not found";

/// An organizational department that tutorials and users are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    pub id: String,
    pub name: String,
}

impl Sector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
