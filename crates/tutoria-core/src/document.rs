//! Collection names and the untyped record form exchanged with backends.
//!
//! Adapters never see typed entities. The store converts `Sector`, `User` and
//! `Tutorial` values to and from [`Document`]s, which carry the record id next
//! to a JSON object of the remaining fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{Result, TutoriaError};

/// JSON object holding every entity field except `id`.
pub type Fields = Map<String, Value>;

/// The three named collections every backend exposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Collection {
    Sectors,
    Tutorials,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Sectors, Collection::Tutorials, Collection::Users];

    /// Entity name used in `NotFound` errors.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Collection::Sectors => "sector",
            Collection::Tutorials => "tutorial",
            Collection::Users => "user",
        }
    }
}

/// A stored record: its id plus the entity fields, flattened when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Splits a serializable entity into a document.
    ///
    /// The entity must serialize to a JSON object with a string `id` field.
    pub fn from_entity<T: Serialize>(entity: &T) -> Result<Self> {
        let mut fields = to_fields(entity)?;
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            _ => {
                return Err(TutoriaError::Serialization {
                    format: "JSON".to_string(),
                    message: "entity has no string 'id' field".to_string(),
                });
            }
        };
        Ok(Self { id, fields })
    }

    /// Rebuilds a typed entity from this document.
    pub fn into_entity<T: DeserializeOwned>(self) -> Result<T> {
        let mut object = self.fields;
        object.insert("id".to_string(), Value::String(self.id));
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Shallow-merges `partial` into this document's fields.
    ///
    /// An `id` key in `partial` is ignored; the record key never changes.
    pub fn merge(&mut self, partial: &Fields) {
        for (key, value) in partial {
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// Serializes a value that must be a JSON object (entities, patches).
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(TutoriaError::Serialization {
            format: "JSON".to_string(),
            message: format!("expected a JSON object, got {other}"),
        }),
    }
}

/// Converts a batch of documents into typed entities, skipping malformed ones.
///
/// Returns the parsed entities and the ids of the documents that failed.
pub fn entities_from_documents<T: DeserializeOwned>(
    documents: Vec<Document>,
) -> (Vec<T>, Vec<String>) {
    let mut entities = Vec::with_capacity(documents.len());
    let mut rejected = Vec::new();
    for document in documents {
        let id = document.id.clone();
        match document.into_entity::<T>() {
            Ok(entity) => entities.push(entity),
            Err(_) => rejected.push(id),
        }
    }
    (entities, rejected)
}
