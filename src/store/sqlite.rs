//! SQLite backend.
//!
//! One `records` row per chunk, with the vector stored as a little-endian
//! `f32` BLOB. Metadata filters run in SQL; distance ranking is a
//! brute-force scan over the filtered rows.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{rank, reject_empty_filter, Space, UpsertBatch, VectorStore};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{Category, ChunkMetadata, RecordFilter, RetrievalMatch, StoredRecord};
use crate::{db, migrate};

pub struct SqliteStore {
    pool: SqlitePool,
    space: Space,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `store.path`.
    pub async fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config.path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::with_pool(pool, config.space))
    }

    pub fn with_pool(pool: SqlitePool, space: Space) -> Self {
        Self { pool, space }
    }
}

/// Encode a vector as little-endian bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &RecordFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if !filter.sources.is_empty() {
        builder.push(" AND source IN (");
        let mut separated = builder.separated(", ");
        for source in &filter.sources {
            separated.push_bind(source.clone());
        }
        separated.push_unseparated(")");
    }
}

fn row_metadata(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkMetadata, StoreError> {
    let category: String = row.try_get("category")?;
    Ok(ChunkMetadata {
        source: row.try_get("source")?,
        chunk_index: row.try_get("chunk_index")?,
        file_hash: row.try_get("file_hash")?,
        category: category
            .parse::<Category>()
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, batch: &UpsertBatch) -> Result<(), StoreError> {
        batch.validate()?;
        let mut tx = self.pool.begin().await?;
        for i in 0..batch.len() {
            let metadata = &batch.metadatas[i];
            sqlx::query(
                r#"
                INSERT INTO records (id, document, embedding, dims, source, chunk_index, file_hash, category)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document = excluded.document,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    source = excluded.source,
                    chunk_index = excluded.chunk_index,
                    file_hash = excluded.file_hash,
                    category = excluded.category
                "#,
            )
            .bind(&batch.ids[i])
            .bind(&batch.documents[i])
            .bind(vec_to_blob(&batch.embeddings[i]))
            .bind(batch.embeddings[i].len() as i64)
            .bind(&metadata.source)
            .bind(metadata.chunk_index)
            .bind(&metadata.file_hash)
            .bind(metadata.category.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievalMatch>, StoreError> {
        let mut builder = QueryBuilder::new(
            "SELECT id, document, embedding, source, chunk_index, file_hash, category FROM records",
        );
        push_filter(&mut builder, filter);
        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            matches.push(RetrievalMatch {
                id: row.try_get("id")?,
                document: row.try_get("document")?,
                metadata: row_metadata(row)?,
                distance: self.space.distance(embedding, &blob_to_vec(&blob)),
            });
        }
        Ok(rank(matches, top_k))
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        let mut builder = QueryBuilder::new(
            "SELECT id, document, source, chunk_index, file_hash, category FROM records",
        );
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY source, chunk_index");
        let rows = builder.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(StoredRecord {
                    id: row.try_get("id")?,
                    document: row.try_get("document")?,
                    metadata: row_metadata(row)?,
                })
            })
            .collect()
    }

    async fn delete(&self, filter: &RecordFilter) -> Result<(), StoreError> {
        reject_empty_filter(filter)?;
        let mut builder = QueryBuilder::new("DELETE FROM records");
        push_filter(&mut builder, filter);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
