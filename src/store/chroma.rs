//! Chroma HTTP backend.
//!
//! Talks to a Chroma server's v2 REST API. Every collection route is scoped
//! to the configured tenant and database, abbreviated `{db}` below:
//! `/api/v2/tenants/{tenant}/databases/{database}`. The collection is
//! created on connect if it does not exist yet, with the configured distance
//! space and HNSW parameters stored as collection metadata.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | connect | `POST {db}/collections` (`get_or_create`) |
//! | upsert | `POST {db}/collections/{id}/upsert` |
//! | query | `POST {db}/collections/{id}/query` |
//! | get | `POST {db}/collections/{id}/get` |
//! | delete | `POST {db}/collections/{id}/delete` |
//! | count | `GET {db}/collections/{id}/count` |

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{reject_empty_filter, UpsertBatch, VectorStore};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{ChunkMetadata, RecordFilter, RetrievalMatch, StoredRecord};

pub struct ChromaStore {
    client: reqwest::Client,
    base: String,
    collection_id: String,
    collection: String,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<ChunkMetadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<ChunkMetadata>>>,
}

impl ChromaStore {
    /// Connect and get-or-create the configured collection.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let base = api_base(config);

        let mut store = Self {
            client,
            base,
            collection_id: String::new(),
            collection: config.collection.clone(),
        };

        let body = json!({
            "name": config.collection,
            "metadata": collection_metadata(config),
            "get_or_create": true,
        });
        let created: CollectionResponse = store.post("/collections", &body).await?;
        tracing::debug!(collection = %config.collection, id = %created.id, "chroma collection ready");
        store.collection_id = created.id;
        Ok(store)
    }

    fn collection_path(&self, op: &str) -> String {
        format!("/collections/{}/{}", self.collection_id, op)
    }

    fn unreachable(&self, err: reqwest::Error) -> StoreError {
        if err.is_connect() || err.is_timeout() {
            StoreError::Unreachable {
                url: self.base.clone(),
                reason: err.to_string(),
            }
        } else {
            StoreError::Transport(err.to_string())
        }
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, StoreError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        self.decode(resp).await
    }

    /// POST where only the status matters; the body is discarded.
    async fn post_unit(&self, path: &str, body: &Value) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        self.decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        resp.json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }
}

/// Root of the tenant- and database-scoped v2 routes.
fn api_base(config: &StoreConfig) -> String {
    format!(
        "{}/api/v2/tenants/{}/databases/{}",
        config.url.trim_end_matches('/'),
        config.tenant,
        config.database
    )
}

fn collection_metadata(config: &StoreConfig) -> Value {
    let mut metadata = Map::new();
    metadata.insert("hnsw:space".into(), json!(config.space.as_str()));
    if let Some(n) = config.hnsw_num_threads {
        metadata.insert("hnsw:num_threads".into(), json!(n));
    }
    if let Some(ef) = config.hnsw_construction_ef {
        metadata.insert("hnsw:construction_ef".into(), json!(ef));
    }
    if let Some(ef) = config.hnsw_search_ef {
        metadata.insert("hnsw:search_ef".into(), json!(ef));
    }
    Value::Object(metadata)
}

/// Translate a [`RecordFilter`] into a Chroma `where` clause.
///
/// Returns `None` for an empty filter.
pub(crate) fn where_clause(filter: &RecordFilter) -> Option<Value> {
    let mut conditions = Vec::new();
    if let Some(category) = filter.category {
        conditions.push(json!({ "type": category.as_str() }));
    }
    match filter.sources.as_slice() {
        [] => {}
        [single] => conditions.push(json!({ "source": single })),
        many => conditions.push(json!({ "source": { "$in": many } })),
    }
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(json!({ "$and": conditions })),
    }
}

fn missing(field: &str, id: &str) -> StoreError {
    StoreError::InvalidResponse(format!("record {} has no {}", id, field))
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, batch: &UpsertBatch) -> Result<(), StoreError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        let body = json!({
            "ids": batch.ids,
            "embeddings": batch.embeddings,
            "documents": batch.documents,
            "metadatas": batch.metadatas,
        });
        self.post_unit(&self.collection_path("upsert"), &body).await
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievalMatch>, StoreError> {
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = where_clause(filter) {
            body["where"] = clause;
        }
        let resp: QueryResponse = self.post(&self.collection_path("query"), &body).await?;

        let ids = resp.ids.into_iter().next().unwrap_or_default();
        let documents = resp.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let metadatas = resp.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let distances = resp.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();

        let mut matches = Vec::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            let metadata = metadatas
                .get(i)
                .cloned()
                .flatten()
                .ok_or_else(|| missing("metadata", &id))?;
            let distance = distances
                .get(i)
                .copied()
                .flatten()
                .ok_or_else(|| missing("distance", &id))?;
            matches.push(RetrievalMatch {
                document: documents.get(i).cloned().flatten().unwrap_or_default(),
                id,
                metadata,
                distance,
            });
        }
        Ok(super::rank(matches, top_k))
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        let mut body = json!({ "include": ["documents", "metadatas"] });
        if let Some(clause) = where_clause(filter) {
            body["where"] = clause;
        }
        let resp: GetResponse = self.post(&self.collection_path("get"), &body).await?;
        let documents = resp.documents.unwrap_or_default();
        let metadatas = resp.metadatas.unwrap_or_default();

        resp.ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let metadata = metadatas
                    .get(i)
                    .cloned()
                    .flatten()
                    .ok_or_else(|| missing("metadata", &id))?;
                Ok(StoredRecord {
                    document: documents.get(i).cloned().flatten().unwrap_or_default(),
                    id,
                    metadata,
                })
            })
            .collect()
    }

    async fn delete(&self, filter: &RecordFilter) -> Result<(), StoreError> {
        reject_empty_filter(filter)?;
        let body = json!({ "where": where_clause(filter) });
        self.post_unit(&self.collection_path("delete"), &body).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.get_json(&self.collection_path("count")).await
    }
}
