//! Dump indexed records.
//!
//! Used by `assis list`. Records are printed grouped by source in chunk
//! order, one block per chunk.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::models::{Category, RecordFilter, StoredRecord};
use crate::store::{open_store, VectorStore};

/// Fetch every record (optionally of one category) sorted by source and chunk index.
pub async fn list_records(
    store: &dyn VectorStore,
    category: Option<Category>,
) -> Result<Vec<StoredRecord>> {
    let mut records = store
        .get(&RecordFilter::category(category))
        .await
        .context("cannot read records from vector store")?;
    records.sort_by(|a, b| {
        a.metadata
            .source
            .cmp(&b.metadata.source)
            .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
    });
    Ok(records)
}

pub fn format_record(record: &StoredRecord) -> String {
    format!(
        "{} [{}] chunk {}\n{}\n{}",
        record.metadata.source,
        record.metadata.category,
        record.metadata.chunk_index,
        record.document,
        "-".repeat(40)
    )
}

pub async fn run_list(config: &Config, category: Option<Category>) -> Result<()> {
    let store = open_store(&config.store)
        .await
        .context("cannot open vector store")?;
    let records = list_records(store.as_ref(), category).await?;
    for record in &records {
        println!("{}", format_record(record));
    }
    println!("{} records", records.len());
    Ok(())
}
