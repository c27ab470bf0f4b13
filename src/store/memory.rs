//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Queries are a
//! brute-force scan under the configured [`Space`].

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{rank, reject_empty_filter, Space, UpsertBatch, VectorStore};
use crate::error::StoreError;
use crate::models::{ChunkMetadata, RecordFilter, RetrievalMatch, StoredRecord};

struct Record {
    document: String,
    embedding: Vec<f32>,
    metadata: ChunkMetadata,
}

pub struct InMemoryStore {
    space: Space,
    records: RwLock<BTreeMap<String, Record>>,
}

impl InMemoryStore {
    pub fn new(space: Space) -> Self {
        Self {
            space,
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Space::default())
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, batch: &UpsertBatch) -> Result<(), StoreError> {
        batch.validate()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for i in 0..batch.len() {
            records.insert(
                batch.ids[i].clone(),
                Record {
                    document: batch.documents[i].clone(),
                    embedding: batch.embeddings[i].clone(),
                    metadata: batch.metadatas[i].clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievalMatch>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let matches = records
            .iter()
            .filter(|(_, r)| filter.matches(&r.metadata))
            .map(|(id, r)| RetrievalMatch {
                id: id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: self.space.distance(embedding, &r.embedding),
            })
            .collect();
        Ok(rank(matches, top_k))
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|(_, r)| filter.matches(&r.metadata))
            .map(|(id, r)| StoredRecord {
                id: id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
            })
            .collect())
    }

    async fn delete(&self, filter: &RecordFilter) -> Result<(), StoreError> {
        reject_empty_filter(filter)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.retain(|_, r| !filter.matches(&r.metadata));
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::build_chunks;
    use crate::models::Category;

    fn batch(category: Category, path: &str, text: &str, vectors: Vec<Vec<f32>>) -> UpsertBatch {
        let chunks = build_chunks(category, path, text, "hash", 1);
        UpsertBatch::from_chunks(&chunks, vectors).unwrap()
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryStore::default();
        store
            .upsert(&batch(Category::Config, "/etc/a", "old", vec![vec![1.0, 0.0]]))
            .await
            .unwrap();
        store
            .upsert(&batch(Category::Config, "/etc/a", "new", vec![vec![0.0, 1.0]]))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let all = store.get(&RecordFilter::default()).await.unwrap();
        assert_eq!(all[0].document, "new");
    }

    #[tokio::test]
    async fn query_filters_by_category_and_ranks() {
        let store = InMemoryStore::default();
        store
            .upsert(&batch(
                Category::Config,
                "/etc/a",
                "near\nfar",
                vec![vec![1.0, 0.0], vec![5.0, 5.0]],
            ))
            .await
            .unwrap();
        store
            .upsert(&batch(Category::Home, "/home/u/x", "home", vec![vec![1.0, 0.0]]))
            .await
            .unwrap();

        let all = store
            .query(&[1.0, 0.0], 10, &RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));

        let config = store
            .query(&[1.0, 0.0], 10, &RecordFilter::category(Some(Category::Config)))
            .await
            .unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config[0].document, "near");
        assert_eq!(config[0].distance, 0.0);
    }

    #[tokio::test]
    async fn delete_by_source_leaves_others() {
        let store = InMemoryStore::default();
        store
            .upsert(&batch(Category::Config, "/etc/a", "x\ny", vec![vec![1.0], vec![2.0]]))
            .await
            .unwrap();
        store
            .upsert(&batch(Category::Config, "/etc/b", "z", vec![vec![3.0]]))
            .await
            .unwrap();
        let filter = RecordFilter {
            category: None,
            sources: vec!["/etc/a".to_string()],
        };
        store.delete(&filter).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.delete(&RecordFilter::default()).await.is_err());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
