//! ArangoDB client over the HTTP API.
//!
//! Queries go through the AQL cursor API with bind variables only; no
//! collection or attribute name is spliced into query text.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use docrel_core::{CollectionKind, CollectionRequirement, Direction, Document, SourceConfig};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{CollectionInfo, DocumentCursor, DocumentStore, StoreError};

/// Documents fetched per round-trip during a full scan.
const SCAN_BATCH_SIZE: u32 = 1000;
/// Seconds the server keeps an idle cursor alive.
const CURSOR_TTL_SECS: u32 = 300;

const DOCUMENT_COLLECTION_TYPE: u8 = 2;
const EDGE_COLLECTION_TYPE: u8 = 3;

/// Document store backed by an ArangoDB server.
#[derive(Debug, Clone)]
pub struct ArangoStore {
    client: Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionEntry {
    name: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    is_system: bool,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl ArangoStore {
    /// Creates a client for the configured server and database.
    ///
    /// No request is made until the first operation.
    pub fn new(config: &SourceConfig) -> Result<Self, StoreError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    fn db_url(&self, path: &str) -> String {
        format!(
            "{}/_db/{}{}",
            self.base_url,
            urlencoding::encode(&self.database),
            path
        )
    }

    fn system_url(&self, path: &str) -> String {
        format!("{}/_db/_system{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> Result<Response, StoreError> {
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password));
        if let Some(body) = body {
            request = request.json(&body);
        }
        Ok(request.send().await?)
    }

    async fn expect_success(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error_message.unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Err(StoreError::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    async fn query(
        &self,
        aql: &str,
        bind_vars: Value,
        batch_size: u32,
    ) -> Result<CursorResponse, StoreError> {
        let body = json!({
            "query": aql,
            "bindVars": bind_vars,
            "batchSize": batch_size,
            "ttl": CURSOR_TTL_SECS,
        });
        let response = self
            .send(Method::POST, self.db_url("/_api/cursor"), Some(body))
            .await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    /// Runs a single-result query and releases its cursor.
    async fn query_first(&self, aql: &str, bind_vars: Value) -> Result<Option<Value>, StoreError> {
        let response = self.query(aql, bind_vars, 1).await?;
        if response.has_more {
            if let Some(id) = &response.id {
                self.delete_cursor(id).await?;
            }
        }
        Ok(response.result.into_iter().next().filter(|v| !v.is_null()))
    }

    async fn next_batch(&self, cursor_id: &str) -> Result<CursorResponse, StoreError> {
        let url = self.db_url(&format!("/_api/cursor/{}", urlencoding::encode(cursor_id)));
        let response = self.send(Method::PUT, url, None).await?;
        Ok(Self::expect_success(response).await?.json().await?)
    }

    async fn delete_cursor(&self, cursor_id: &str) -> Result<(), StoreError> {
        let url = self.db_url(&format!("/_api/cursor/{}", urlencoding::encode(cursor_id)));
        let response = self.send(Method::DELETE, url, None).await?;
        // An exhausted or expired cursor is already gone.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionEntry>, StoreError> {
        let response = self
            .send(
                Method::GET,
                self.db_url("/_api/collection?excludeSystem=true"),
                None,
            )
            .await?;
        let list: ListResponse<CollectionEntry> = Self::expect_success(response).await?.json().await?;
        Ok(list.result.into_iter().filter(|c| !c.is_system).collect())
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let url = self.db_url(&format!(
            "/_api/collection/{}/count",
            urlencoding::encode(collection)
        ));
        let response = self.send(Method::GET, url, None).await?;
        let count: CountResponse = Self::expect_success(response).await?.json().await?;
        Ok(count.count)
    }
}

#[async_trait]
impl DocumentStore for ArangoStore {
    async fn ensure_database(&self) -> Result<(), StoreError> {
        let response = self
            .send(Method::GET, self.system_url("/_api/database/user"), None)
            .await?;
        let databases: ListResponse<String> = Self::expect_success(response).await?.json().await?;
        if databases.result.iter().any(|name| name == &self.database) {
            return Ok(());
        }

        let response = self
            .send(
                Method::POST,
                self.system_url("/_api/database"),
                Some(json!({ "name": self.database })),
            )
            .await?;
        Self::expect_success(response).await?;
        tracing::info!("Created database {}", self.database);
        Ok(())
    }

    async fn ensure_collections(
        &self,
        required: &[CollectionRequirement],
    ) -> Result<(), StoreError> {
        let mut existing: HashSet<String> = self
            .list_collections()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();

        for requirement in required {
            if existing.contains(&requirement.name) {
                continue;
            }
            let kind = match requirement.kind {
                CollectionKind::Document => DOCUMENT_COLLECTION_TYPE,
                CollectionKind::Edge => EDGE_COLLECTION_TYPE,
            };
            let response = self
                .send(
                    Method::POST,
                    self.db_url("/_api/collection"),
                    Some(json!({ "name": requirement.name, "type": kind })),
                )
                .await?;
            Self::expect_success(response).await?;
            tracing::info!("Created collection {}", requirement.name);
            existing.insert(requirement.name.clone());
        }
        Ok(())
    }

    async fn scan(&self, collection: &str) -> Result<Box<dyn DocumentCursor>, StoreError> {
        let response = self
            .query(
                "FOR doc IN @@collection RETURN doc",
                json!({ "@collection": collection }),
                SCAN_BATCH_SIZE,
            )
            .await?;
        Ok(Box::new(ArangoCursor {
            store: self.clone(),
            cursor_id: if response.has_more { response.id } else { None },
            buffer: response.result.into(),
        }))
    }

    async fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Document>, StoreError> {
        let (access, mut bind_vars) = attribute_access(field);
        bind_vars.insert("@collection".to_string(), json!(collection));
        bind_vars.insert("value".to_string(), value.clone());
        let aql = format!(
            "FOR doc IN @@collection FILTER doc{} == @value LIMIT 1 RETURN doc",
            access
        );
        self.query_first(&aql, Value::Object(bind_vars))
            .await?
            .map(document_from)
            .transpose()
    }

    async fn follow_edge(
        &self,
        edge_collection: &str,
        direction: Direction,
        handle: &str,
    ) -> Result<Option<String>, StoreError> {
        let bind_vars = json!({
            "@edges": edge_collection,
            "source": direction.source_field(),
            "target": direction.target_field(),
            "handle": handle,
        });
        let next = self
            .query_first(
                "FOR edge IN @@edges FILTER edge[@source] == @handle LIMIT 1 RETURN edge[@target]",
                bind_vars,
            )
            .await?;
        match next {
            None => Ok(None),
            Some(Value::String(handle)) => Ok(Some(handle)),
            Some(other) => Err(StoreError::DecodeError(format!(
                "Edge endpoint in {} is not a handle: {}",
                edge_collection, other
            ))),
        }
    }

    async fn fetch(&self, handle: &str) -> Result<Option<Document>, StoreError> {
        let Some(path) = document_path(handle) else {
            return Ok(None);
        };
        let response = self
            .send(Method::GET, self.db_url(&format!("/_api/document/{}", path)), None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = Self::expect_success(response).await?.json().await?;
        document_from(value).map(Some)
    }

    async fn collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let mut infos = Vec::new();
        for entry in self.list_collections().await? {
            // Counting may need more permissions than reading; report unknown.
            let count = self.count(&entry.name).await.ok();
            infos.push(CollectionInfo {
                kind: if entry.kind == EDGE_COLLECTION_TYPE {
                    CollectionKind::Edge
                } else {
                    CollectionKind::Document
                },
                name: entry.name,
                count,
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn sample(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        self.query_first(
            "FOR doc IN @@collection LIMIT 1 RETURN doc",
            json!({ "@collection": collection }),
        )
        .await?
        .map(document_from)
        .transpose()
    }
}

/// Cursor over a scan, fetching further batches on demand.
struct ArangoCursor {
    store: ArangoStore,
    buffer: VecDeque<Value>,
    /// Set while the server still holds more results.
    cursor_id: Option<String>,
}

#[async_trait]
impl DocumentCursor for ArangoCursor {
    async fn next(&mut self) -> Result<Option<Document>, StoreError> {
        loop {
            if let Some(value) = self.buffer.pop_front() {
                return document_from(value).map(Some);
            }
            let Some(id) = self.cursor_id.clone() else {
                return Ok(None);
            };
            let batch = self.store.next_batch(&id).await?;
            self.buffer.extend(batch.result);
            self.cursor_id = if batch.has_more {
                batch.id.or(Some(id))
            } else {
                None
            };
        }
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        match self.cursor_id.take() {
            Some(id) => self.store.delete_cursor(&id).await,
            None => Ok(()),
        }
    }
}

fn document_from(value: Value) -> Result<Document, StoreError> {
    Document::from_value(value).map_err(|e| StoreError::DecodeError(e.to_string()))
}

/// Builds `[@f0][@f1]...` for a dotted attribute path, with its bind variables.
fn attribute_access(field: &str) -> (String, Map<String, Value>) {
    let mut access = String::new();
    let mut bind_vars = Map::new();
    for (i, segment) in field.split('.').enumerate() {
        let name = format!("f{}", i);
        access.push_str(&format!("[@{}]", name));
        bind_vars.insert(name, json!(segment));
    }
    (access, bind_vars)
}

/// URL path (`collection/key`, each part encoded) for a document handle.
fn document_path(handle: &str) -> Option<String> {
    let (collection, key) = handle.split_once('/')?;
    if collection.is_empty() || key.is_empty() {
        return None;
    }
    Some(format!(
        "{}/{}",
        urlencoding::encode(collection),
        urlencoding::encode(key)
    ))
}
