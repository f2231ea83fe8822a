//! The entity record model.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-managed entity metadata.
///
/// The backend stamps these on every stored entity. The last-modified time
/// drives delta-set change detection server-side; the client only carries
/// the block through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Entity creation time, as reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ect: Option<String>,
    /// Last-modified time, as reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lmt: Option<String>,
}

impl Metadata {
    /// Creates a metadata block with both timestamps set.
    pub fn new(ect: impl Into<String>, lmt: impl Into<String>) -> Self {
        Self {
            ect: Some(ect.into()),
            lmt: Some(lmt.into()),
        }
    }
}

/// An application record stored in a collection.
///
/// Entities expose a unique string identifier and, when present, the
/// backend metadata block. Assigning an id is a pure value transformation:
/// [`with_entity_id`](Entity::with_entity_id) returns a new record rather
/// than poking a field in place, so temp-id promotion during push cannot
/// observe a half-renamed record.
pub trait Entity:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Returns the entity id, if one has been assigned.
    ///
    /// An empty string counts as unassigned.
    fn entity_id(&self) -> Option<&str>;

    /// Returns a copy of this record carrying `id`.
    #[must_use]
    fn with_entity_id(self, id: impl Into<String>) -> Self;

    /// Returns a copy of this record with no id assigned.
    ///
    /// Used when pushing an offline create: the temp id is stripped so the
    /// backend assigns the permanent one.
    #[must_use]
    fn without_entity_id(self) -> Self;

    /// Returns the backend metadata block, if present.
    fn metadata(&self) -> Option<&Metadata> {
        None
    }
}

/// A schemaless entity record.
///
/// `Document` is the reference [`Entity`] implementation: a first-class id,
/// an optional metadata block, and every other field preserved opaquely in
/// an open map. Typed application records can implement [`Entity`] directly;
/// `Document` is what the engine's own tests use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The entity id, if assigned.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Backend metadata, if the entity has been stored remotely.
    #[serde(rename = "_kmd", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// All remaining fields, preserved as-is.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Creates an empty document with no id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, returning the document for chaining.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a field value, if present.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Entity for Document {
    fn entity_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn without_entity_id(mut self) -> Self {
        self.id = None;
        self
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_counts_as_unassigned() {
        let doc = Document::new().with_entity_id("");
        assert_eq!(doc.entity_id(), None);

        let doc = doc.with_entity_id("e1");
        assert_eq!(doc.entity_id(), Some("e1"));
    }

    #[test]
    fn with_entity_id_is_a_value_transformation() {
        let doc = Document::new().with_field("name", "alice");
        let named = doc.clone().with_entity_id("e1");

        assert_eq!(doc.entity_id(), None);
        assert_eq!(named.entity_id(), Some("e1"));
        assert_eq!(named.field("name"), doc.field("name"));
    }

    #[test]
    fn without_entity_id_strips_the_id() {
        let doc = Document::new().with_entity_id("temp_x").without_entity_id();
        assert_eq!(doc.entity_id(), None);
    }

    #[test]
    fn unknown_fields_survive_a_roundtrip() {
        let json = r#"{"_id":"e1","_kmd":{"lmt":"2024-01-01T00:00:00Z"},"score":7,"nested":{"a":1}}"#;
        let doc: Document = serde_json::from_str(json).unwrap();

        assert_eq!(doc.entity_id(), Some("e1"));
        assert_eq!(doc.metadata().unwrap().lmt.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(doc.field("score"), Some(&Value::from(7)));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["nested"]["a"], Value::from(1));
    }

    #[test]
    fn absent_id_is_not_serialized() {
        let doc = Document::new().with_field("a", 1);
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("_id"));
    }
}
