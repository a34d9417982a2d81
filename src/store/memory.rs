//! In-memory document store for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docrel_core::{
    resolve_document_field, CollectionKind, CollectionRequirement, Direction, Document,
};
use serde_json::{json, Value};

use super::{CollectionInfo, DocumentCursor, DocumentStore, StoreError};

#[derive(Debug, Default)]
struct Collection {
    kind: Option<CollectionKind>,
    docs: Vec<Document>,
}

/// Document store kept entirely in memory.
///
/// Records the store calls it serves so tests can assert on traversal.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Collection>>,
    calls: Mutex<Vec<String>>,
    open_cursors: Arc<AtomicUsize>,
    fail_scan_after: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document to `collection`.
    pub fn insert(&self, collection: &str, key: &str, properties: Value) -> Document {
        let doc = Document::with_key(collection, key, properties).unwrap();
        let mut collections = self.collections.lock().unwrap();
        let entry = collections.entry(collection.to_string()).or_default();
        entry.kind.get_or_insert(CollectionKind::Document);
        entry.docs.push(doc.clone());
        doc
    }

    /// Adds an edge `from -> to` to `collection`.
    pub fn insert_edge(&self, collection: &str, key: &str, from: &str, to: &str) {
        let doc = Document::with_key(collection, key, json!({ "_from": from, "_to": to })).unwrap();
        let mut collections = self.collections.lock().unwrap();
        let entry = collections.entry(collection.to_string()).or_default();
        entry.kind = Some(CollectionKind::Edge);
        entry.docs.push(doc);
    }

    /// Replaces a property on an existing document.
    pub fn update(&self, collection: &str, key: &str, field: &str, value: Value) {
        let mut collections = self.collections.lock().unwrap();
        let docs = &mut collections.get_mut(collection).unwrap().docs;
        let position = docs.iter().position(|d| d.key() == Some(key)).unwrap();
        let mut raw: Value = docs[position].clone().into();
        raw[field] = value;
        docs[position] = Document::from_value(raw).unwrap();
    }

    pub fn kind_of(&self, collection: &str) -> Option<CollectionKind> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|c| c.kind)
    }

    /// Store calls served so far, e.g. `follow_edge contains forward tasks/t1`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Makes every scan fail after yielding `count` documents.
    pub fn fail_scans_after(&self, count: usize) {
        *self.fail_scan_after.lock().unwrap() = Some(count);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn docs(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_database(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ensure_collections(
        &self,
        required: &[CollectionRequirement],
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().unwrap();
        for requirement in required {
            let entry = collections.entry(requirement.name.clone()).or_default();
            entry.kind.get_or_insert(requirement.kind);
        }
        Ok(())
    }

    async fn scan(&self, collection: &str) -> Result<Box<dyn DocumentCursor>, StoreError> {
        self.record(format!("scan {}", collection));
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryCursor {
            docs: self.docs(collection).into(),
            open: Some(self.open_cursors.clone()),
            remaining_before_failure: *self.fail_scan_after.lock().unwrap(),
        }))
    }

    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Document>, StoreError> {
        self.record(format!("find_one {} {} {}", collection, field, value));
        Ok(self
            .docs(collection)
            .into_iter()
            .find(|doc| resolve_document_field(doc, field) == Some(value)))
    }

    async fn follow_edge(
        &self,
        edge_collection: &str,
        direction: Direction,
        handle: &str,
    ) -> Result<Option<String>, StoreError> {
        let label = match direction {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        };
        self.record(format!("follow_edge {} {} {}", edge_collection, label, handle));
        Ok(self.docs(edge_collection).into_iter().find_map(|edge| {
            let matches = resolve_document_field(&edge, direction.source_field())
                .and_then(Value::as_str)
                == Some(handle);
            if !matches {
                return None;
            }
            resolve_document_field(&edge, direction.target_field())
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    async fn fetch(&self, handle: &str) -> Result<Option<Document>, StoreError> {
        self.record(format!("fetch {}", handle));
        let Some((collection, _)) = handle.split_once('/') else {
            return Ok(None);
        };
        Ok(self
            .docs(collection)
            .into_iter()
            .find(|doc| doc.id() == Some(handle)))
    }

    async fn collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .iter()
            .map(|(name, c)| CollectionInfo {
                name: name.clone(),
                kind: c.kind.unwrap_or(CollectionKind::Document),
                count: Some(c.docs.len() as u64),
            })
            .collect())
    }

    async fn sample(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.docs(collection).into_iter().next())
    }
}

struct MemoryCursor {
    docs: VecDeque<Document>,
    open: Option<Arc<AtomicUsize>>,
    remaining_before_failure: Option<usize>,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next(&mut self) -> Result<Option<Document>, StoreError> {
        if let Some(remaining) = self.remaining_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(StoreError::ConnectionError("connection reset".to_string()));
            }
            *remaining -= 1;
        }
        Ok(self.docs.pop_front())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(open) = self.open.take() {
            open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
