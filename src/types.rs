//! Core types for the active collection.

use crate::error::{CollectionError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Name of the identity field carried by every document.
pub const ID_FIELD: &str = "_id";

/// Identity of a document.
///
/// Serialized untagged, so an id reads and writes as the bare JSON value
/// (`1`, `"abc"`, or `{"$oid": "..."}`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    Str(String),
    ObjectId {
        #[serde(rename = "$oid")]
        oid: String,
    },
}

impl DocumentId {
    /// Create an object id from its hex representation.
    pub fn object_id(hex: impl Into<String>) -> Self {
        DocumentId::ObjectId { oid: hex.into() }
    }

    /// Read an id from a JSON value. Returns `None` for values that are not
    /// identities (null, floats, booleans, arrays, arbitrary objects).
    pub fn from_value(value: &Value) -> Option<Self> {
        DocumentId::deserialize(value).ok()
    }

    /// Convert to the JSON value stored under [`ID_FIELD`].
    pub fn to_value(&self) -> Value {
        match self {
            DocumentId::Int(i) => Value::from(*i),
            DocumentId::Str(s) => Value::String(s.clone()),
            DocumentId::ObjectId { oid } => {
                let mut map = Map::new();
                map.insert("$oid".to_string(), Value::String(oid.clone()));
                Value::Object(map)
            }
        }
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{}", i),
            DocumentId::Str(s) => write!(f, "{:?}", s),
            DocumentId::ObjectId { oid } => write!(f, "ObjectId({})", oid),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(id: i64) -> Self {
        DocumentId::Int(id)
    }
}

impl From<i32> for DocumentId {
    fn from(id: i32) -> Self {
        DocumentId::Int(id.into())
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId::Str(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId::Str(id)
    }
}

/// A self-describing record: a JSON object whose `_id` field is its identity.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Eq for Document {}

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a document from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CollectionError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The document's identity, if it carries a usable one.
    pub fn id(&self) -> Option<DocumentId> {
        identity_of(self)
    }

    /// Like [`Document::id`], but a present `_id` that is not a valid identity
    /// is an error instead of being treated as absent. A null `_id` counts as
    /// absent.
    pub fn checked_id(&self) -> Result<Option<DocumentId>> {
        match self.get(ID_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => DocumentId::from_value(value).map(Some).ok_or_else(|| {
                CollectionError::InvalidDocument(format!("unusable {} value {}", ID_FIELD, value))
            }),
        }
    }

    /// Parse a document from JSON text, which must hold an object.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn set_id(&mut self, id: &DocumentId) {
        self.0.insert(ID_FIELD.to_string(), id.to_value());
    }

    /// Builder form of [`Document::set_id`].
    pub fn with_id(mut self, id: &DocumentId) -> Self {
        self.set_id(id);
        self
    }

    /// Shallow merge: a copy of `self` with every top-level field present in
    /// `changes` overwritten. Nested objects are replaced, not merged.
    pub fn merged(&self, changes: &Document) -> Document {
        let mut merged = self.0.clone();
        for (field, value) in changes.0.iter() {
            merged.insert(field.clone(), value.clone());
        }
        Document(merged)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Read a document's identity field.
pub fn identity_of(doc: &Document) -> Option<DocumentId> {
    doc.get(ID_FIELD).and_then(DocumentId::from_value)
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = CollectionError;

    fn try_from(value: Value) -> Result<Self> {
        Document::from_value(value)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", Value::Object(self.0.clone()))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

/// Equality query selecting a subset of a store's documents.
///
/// A document matches when every filter field is present in it with an equal
/// value. Filters take part in collection identity, so they are `Eq + Hash`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Document);

impl Filter {
    pub fn new(query: Document) -> Self {
        Self(query)
    }

    /// Filter on a single field.
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut query = Document::new();
        query.insert(name, value);
        Self(query)
    }

    /// Add another required field.
    pub fn and(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name, value);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .fields()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }

    pub fn query(&self) -> &Document {
        &self.0
    }
}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_object(self.0.as_map(), state);
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Key order of a JSON object is not part of its equality, so hash keys sorted.
fn hash_object<H: Hasher>(map: &Map<String, Value>, state: &mut H) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    state.write_usize(keys.len());
    for key in keys {
        key.hash(state);
        if let Some(value) = map.get(key) {
            hash_value(value, state);
        }
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => state.write_u8(0),
        Value::Bool(b) => {
            state.write_u8(1);
            b.hash(state);
        }
        Value::Number(n) => {
            state.write_u8(2);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            state.write_u8(3);
            s.hash(state);
        }
        Value::Array(items) => {
            state.write_u8(4);
            state.write_usize(items.len());
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            state.write_u8(5);
            hash_object(map, state);
        }
    }
}

/// Counters describing what a collection has done since it was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Number of completed loads from the store.
    pub loads: u64,
    /// Events that changed the cached map.
    pub events_applied: u64,
    /// Events that were skipped (unloaded, id-less, unknown id on delete).
    pub events_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::hash_map::DefaultHasher;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn hash_of(filter: &Filter) -> u64 {
        let mut hasher = DefaultHasher::new();
        filter.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_identity_of_supported_ids() {
        assert_eq!(identity_of(&doc(json!({"_id": 7}))), Some(DocumentId::Int(7)));
        assert_eq!(
            identity_of(&doc(json!({"_id": "abc"}))),
            Some(DocumentId::from("abc"))
        );
        assert_eq!(
            identity_of(&doc(json!({"_id": {"$oid": "00ff"}}))),
            Some(DocumentId::object_id("00ff"))
        );
    }

    #[test]
    fn test_identity_of_rejects_non_ids() {
        assert_eq!(identity_of(&doc(json!({"a": 1}))), None);
        assert_eq!(identity_of(&doc(json!({"_id": null}))), None);
        assert_eq!(identity_of(&doc(json!({"_id": 1.5}))), None);
        assert_eq!(identity_of(&doc(json!({"_id": [1]}))), None);
        assert_eq!(identity_of(&doc(json!({"_id": true}))), None);
    }

    #[test]
    fn test_checked_id_rejects_unusable_ids() {
        assert_eq!(doc(json!({"a": 1})).checked_id().unwrap(), None);
        assert_eq!(doc(json!({"_id": null})).checked_id().unwrap(), None);
        assert_eq!(
            doc(json!({"_id": "k"})).checked_id().unwrap(),
            Some(DocumentId::from("k"))
        );

        for bad in [json!(u64::MAX), json!(1.5), json!(true), json!({"x": 1})] {
            let result = doc(json!({"_id": bad})).checked_id();
            assert!(matches!(result, Err(CollectionError::InvalidDocument(_))));
        }
    }

    #[test]
    fn test_from_json() {
        let d = Document::from_json(r#"{"_id": 3, "name": "ada"}"#).unwrap();
        assert_eq!(d, doc(json!({"_id": 3, "name": "ada"})));

        assert!(matches!(
            Document::from_json("{\"_id\": "),
            Err(CollectionError::Serialization(_))
        ));
        assert!(matches!(
            Document::from_json("[1, 2]"),
            Err(CollectionError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_id_value_roundtrip_through_document() {
        let id = DocumentId::object_id("5f1d");
        let d = Document::new().with_id(&id);
        assert_eq!(d.get(ID_FIELD), Some(&json!({"$oid": "5f1d"})));
        assert_eq!(d.id(), Some(id));
    }

    #[test]
    fn test_shallow_merge() {
        let old = doc(json!({"_id": 1, "a": 1, "b": 2, "nested": {"x": 1, "y": 2}}));
        let changes = doc(json!({"b": 3, "nested": {"x": 9}}));
        let merged = old.merged(&changes);
        assert_eq!(
            merged,
            doc(json!({"_id": 1, "a": 1, "b": 3, "nested": {"x": 9}}))
        );
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let result = Document::from_value(json!([1, 2]));
        assert!(matches!(result, Err(CollectionError::InvalidDocument(_))));
    }

    #[test]
    fn test_filter_matches() {
        let filter = Filter::field("kind", "task").and("done", false);
        assert!(filter.matches(&doc(json!({"_id": 1, "kind": "task", "done": false}))));
        assert!(!filter.matches(&doc(json!({"_id": 2, "kind": "task", "done": true}))));
        assert!(!filter.matches(&doc(json!({"_id": 3, "kind": "task"}))));
        assert!(Filter::default().matches(&doc(json!({"anything": 1}))));
    }

    #[test]
    fn test_filter_hash_ignores_field_order() {
        let a = Filter::field("x", 1).and("y", json!({"p": 1, "q": 2}));
        let b = Filter::field("y", json!({"q": 2, "p": 1})).and("x", 1);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }
}
