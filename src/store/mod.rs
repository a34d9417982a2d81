//! Document store boundary.
//!
//! The engine only needs a handful of read operations from the document
//! store: full collection scans, single-result equality lookups, single-hop
//! edge traversal and fetch-by-handle. It also makes sure the collections a
//! run reads from exist before the first unit starts.

mod arango;
#[cfg(test)]
pub mod memory;

pub use arango::ArangoStore;

use async_trait::async_trait;
use docrel_core::{CollectionKind, CollectionRequirement, Direction, Document};
use serde_json::Value;

/// Summary of one collection, used by `describe source`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub kind: CollectionKind,
    /// Approximate document count, if the store reported one.
    pub count: Option<u64>,
}

/// Read access to a document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the configured database when it does not exist yet.
    async fn ensure_database(&self) -> Result<(), StoreError>;

    /// Creates any missing collection in `required`.
    async fn ensure_collections(&self, required: &[CollectionRequirement])
        -> Result<(), StoreError>;

    /// Opens a cursor over every document of `collection`.
    ///
    /// Callers must [`close`](DocumentCursor::close) the cursor on every exit
    /// path.
    async fn scan(&self, collection: &str) -> Result<Box<dyn DocumentCursor>, StoreError>;

    /// First document of `collection` whose dotted `field` equals `value`.
    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Document>, StoreError>;

    /// Follows one edge of `edge_collection` away from `handle`.
    ///
    /// Returns the handle at the other end of the first matching edge.
    async fn follow_edge(
        &self,
        edge_collection: &str,
        direction: Direction,
        handle: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Fetches a document by handle. Unknown handles yield `None`.
    async fn fetch(&self, handle: &str) -> Result<Option<Document>, StoreError>;

    /// Lists the non-system collections.
    async fn collections(&self) -> Result<Vec<CollectionInfo>, StoreError>;

    /// Any single document from `collection`.
    async fn sample(&self, collection: &str) -> Result<Option<Document>, StoreError>;
}

/// Server-side cursor over a collection scan.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Next document, or `None` once the scan is exhausted.
    async fn next(&mut self) -> Result<Option<Document>, StoreError>;

    /// Releases the cursor. Safe to call more than once.
    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Errors talking to the document store.
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached.
    ConnectionError(String),
    /// The store rejected a request.
    ApiError { status: u16, message: String },
    /// A response could not be decoded.
    DecodeError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ConnectionError(e) => write!(f, "Document store connection error: {}", e),
            StoreError::ApiError { status, message } => {
                write!(f, "Document store returned {}: {}", status, message)
            }
            StoreError::DecodeError(e) => write!(f, "Failed to decode store response: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::DecodeError(e.to_string())
        } else {
            StoreError::ConnectionError(e.to_string())
        }
    }
}
