//! Query-time retrieval: embed the question, search the store, apply the
//! similarity threshold with a nearest-match fallback, and build the
//! context block.
//!
//! Retrieval is read-only and never treats an empty result as an error.
//!
//! | Store returned | At least one `distance <= threshold` | Outcome |
//! |----------------|--------------------------------------|---------|
//! | matches | yes | [`RetrievalKind::Relevant`]: every passing match |
//! | matches | no | [`RetrievalKind::Fallback`]: the single nearest match |
//! | nothing | n/a | [`RetrievalKind::Empty`]: empty context |

use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::error::RetrieveError;
use crate::models::{Category, RecordFilter, RetrievalMatch};
use crate::store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalKind {
    Relevant,
    Fallback,
    Empty,
}

/// Context selected for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub context: String,
    /// Selected matches in ascending distance order.
    pub matches: Vec<RetrievalMatch>,
    pub kind: RetrievalKind,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.kind == RetrievalKind::Empty
    }
}

/// Keep matches within `threshold`, or fall back to the nearest one.
pub fn select_matches(
    mut results: Vec<RetrievalMatch>,
    threshold: f64,
) -> (Vec<RetrievalMatch>, RetrievalKind) {
    if results.is_empty() {
        return (results, RetrievalKind::Empty);
    }
    results.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.id.cmp(&b.id))
    });

    let passing: Vec<RetrievalMatch> = results
        .iter()
        .filter(|m| m.distance <= threshold)
        .cloned()
        .collect();
    if !passing.is_empty() {
        return (passing, RetrievalKind::Relevant);
    }

    results.truncate(1);
    (results, RetrievalKind::Fallback)
}

/// `"Source: {path}\n{text}\n\n"` per match, in order.
pub fn format_context(matches: &[RetrievalMatch]) -> String {
    matches
        .iter()
        .map(|m| format!("Source: {}\n{}\n\n", m.metadata.source, m.document))
        .collect()
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        category: Option<Category>,
        top_k: usize,
        threshold: f64,
    ) -> Result<Retrieval, RetrieveError> {
        let embedding = embed_query(self.embedder.as_ref(), query).await?;
        let results = self
            .store
            .query(&embedding, top_k, &RecordFilter::category(category))
            .await?;
        tracing::debug!(results = results.len(), top_k, threshold, "store query returned");

        let (matches, kind) = select_matches(results, threshold);
        if kind == RetrievalKind::Fallback {
            tracing::info!(
                distance = matches[0].distance,
                "no match within threshold; using nearest match"
            );
        }
        Ok(Retrieval {
            context: format_context(&matches),
            matches,
            kind,
        })
    }
}
