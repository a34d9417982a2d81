//! Document model for records read from the document store.
//!
//! A document is a JSON object with three reserved metadata fields:
//! `_key` (primary key within its collection), `_id` (global handle of the
//! form `collection/key`) and `_rev` (revision token). Everything else is an
//! arbitrarily nested property tree.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DocumentError;

/// Primary key field.
pub const KEY_FIELD: &str = "_key";
/// Global handle field (`collection/key`).
pub const ID_FIELD: &str = "_id";
/// Revision token field.
pub const REV_FIELD: &str = "_rev";

/// Alias that always refers to the main document of a merge.
pub const MAIN_ALIAS: &str = "main";

/// A read-only record from the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Document(Value);

impl Document {
    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        match value {
            Value::Object(_) => Ok(Self(value)),
            other => Err(DocumentError::NotAnObject(json_kind(&other))),
        }
    }

    /// Builds a document in `collection` with the given key and properties.
    ///
    /// The handle and a placeholder revision are filled in.
    pub fn with_key(collection: &str, key: &str, properties: Value) -> Result<Self, DocumentError> {
        let mut map = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(DocumentError::NotAnObject(json_kind(&other))),
        };
        map.insert(KEY_FIELD.to_string(), Value::String(key.to_string()));
        map.insert(
            ID_FIELD.to_string(),
            Value::String(format!("{}/{}", collection, key)),
        );
        map.entry(REV_FIELD.to_string())
            .or_insert_with(|| Value::String("_0".to_string()));
        Ok(Self(Value::Object(map)))
    }

    /// The primary key, if present.
    pub fn key(&self) -> Option<&str> {
        self.metadata(KEY_FIELD)
    }

    /// The global handle, if present.
    pub fn id(&self) -> Option<&str> {
        self.metadata(ID_FIELD)
    }

    /// The revision token, if present.
    pub fn rev(&self) -> Option<&str> {
        self.metadata(REV_FIELD)
    }

    /// The collection component of the handle.
    pub fn collection(&self) -> Option<&str> {
        self.id().and_then(handle_collection)
    }

    /// The full property map, metadata included.
    pub fn properties(&self) -> &Map<String, Value> {
        match &self.0 {
            Value::Object(map) => map,
            _ => unreachable!("Document always wraps an object"),
        }
    }

    /// The document as a JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Looks up a metadata field (`_key`, `_id` or `_rev`).
    pub fn metadata_value(&self, field: &str) -> Option<&Value> {
        self.properties().get(field)
    }

    fn metadata(&self, field: &str) -> Option<&str> {
        self.metadata_value(field).and_then(Value::as_str)
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.0
    }
}

/// Returns the collection component of a handle (`collection/key`).
pub fn handle_collection(handle: &str) -> Option<&str> {
    handle
        .split_once('/')
        .map(|(collection, _)| collection)
        .filter(|collection| !collection.is_empty())
}

/// Per-document working state for join resolution.
///
/// Maps join aliases (plus `main`) to the documents resolved for them.
#[derive(Debug, Clone)]
pub struct AliasContext {
    docs: HashMap<String, Document>,
}

impl AliasContext {
    /// Creates a context seeded with the main document.
    pub fn new(main: Document) -> Self {
        let mut docs = HashMap::new();
        docs.insert(MAIN_ALIAS.to_string(), main);
        Self { docs }
    }

    pub fn main(&self) -> &Document {
        &self.docs[MAIN_ALIAS]
    }

    pub fn get(&self, alias: &str) -> Option<&Document> {
        self.docs.get(alias)
    }

    pub fn insert(&mut self, alias: impl Into<String>, doc: Document) {
        self.docs.insert(alias.into(), doc);
    }

    pub fn remove(&mut self, alias: &str) -> Option<Document> {
        self.docs.remove(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.docs.contains_key(alias)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
