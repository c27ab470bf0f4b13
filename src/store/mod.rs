//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only seam between the pipeline and the
//! place vectors live. Three backends implement it:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | Chroma HTTP service | [`chroma`] | default; shared with other tools |
//! | SQLite file | [`sqlite`] | single-user, no service to run |
//! | In-memory | [`memory`] | tests and throwaway sessions |
//!
//! Records are keyed by chunk id, so upserting the same id twice replaces
//! the earlier record. Query results are ordered by ascending distance
//! under the collection's [`Space`].

pub mod chroma;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::models::{ChunkMetadata, DocumentChunk, RecordFilter, RetrievalMatch, StoredRecord};

pub use chroma::ChromaStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Distance function of a collection. Smaller is closer for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Space {
    /// Squared euclidean distance.
    #[default]
    L2,
    /// `1 - cosine similarity`.
    Cosine,
    /// `1 - dot product`.
    Ip,
}

impl Space {
    pub fn as_str(&self) -> &'static str {
        match self {
            Space::L2 => "l2",
            Space::Cosine => "cosine",
            Space::Ip => "ip",
        }
    }

    /// Distance between two vectors. Mismatched lengths are infinitely far.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() || a.is_empty() {
            return f64::INFINITY;
        }
        match self {
            Space::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = f64::from(*x) - f64::from(*y);
                    d * d
                })
                .sum(),
            Space::Cosine => 1.0 - cosine_similarity(a, b),
            Space::Ip => 1.0 - dot(a, b),
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

/// Cosine similarity in `[-1, 1]`; 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mag_a = dot(a, a).sqrt();
    let mag_b = dot(b, b).sqrt();
    if mag_a < f64::EPSILON || mag_b < f64::EPSILON {
        0.0
    } else {
        dot(a, b) / (mag_a * mag_b)
    }
}

/// Parallel columns for one upsert call; all four have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertBatch {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub metadatas: Vec<ChunkMetadata>,
}

impl UpsertBatch {
    /// Pair chunks with their vectors, in order.
    pub fn from_chunks(
        chunks: &[DocumentChunk],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, StoreError> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::InvalidRequest(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        Ok(Self {
            ids: chunks.iter().map(|c| c.id.clone()).collect(),
            documents: chunks.iter().map(|c| c.text.clone()).collect(),
            embeddings,
            metadatas: chunks.iter().map(DocumentChunk::metadata).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn validate(&self) -> Result<(), StoreError> {
        let n = self.ids.len();
        if self.documents.len() != n || self.embeddings.len() != n || self.metadatas.len() != n {
            return Err(StoreError::InvalidRequest(
                "upsert columns have different lengths".to_string(),
            ));
        }
        Ok(())
    }
}

/// A persistent collection of `(id, vector, document, metadata)` records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or replace records by id |
/// | [`query`](VectorStore::query) | Nearest records to a vector, ascending distance |
/// | [`get`](VectorStore::get) | Records matching a metadata filter |
/// | [`delete`](VectorStore::delete) | Remove records matching a non-empty filter |
/// | [`count`](VectorStore::count) | Number of stored records |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend label for logs and summaries.
    fn name(&self) -> &str;

    async fn upsert(&self, batch: &UpsertBatch) -> Result<(), StoreError>;

    /// Return up to `top_k` records ordered by ascending distance.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievalMatch>, StoreError>;

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError>;

    /// Delete matching records. An empty filter is rejected rather than
    /// wiping the collection.
    async fn delete(&self, filter: &RecordFilter) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// Order matches by ascending distance, ties by id, and keep `top_k`.
pub(crate) fn rank(mut matches: Vec<RetrievalMatch>, top_k: usize) -> Vec<RetrievalMatch> {
    matches.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches.truncate(top_k);
    matches
}

pub(crate) fn reject_empty_filter(filter: &RecordFilter) -> Result<(), StoreError> {
    if filter.is_empty() {
        return Err(StoreError::InvalidRequest(
            "refusing to delete with an empty filter".to_string(),
        ));
    }
    Ok(())
}

/// Open the configured backend.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        StoreBackend::Chroma => Ok(Arc::new(ChromaStore::connect(config).await?)),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(config).await?)),
    }
}
