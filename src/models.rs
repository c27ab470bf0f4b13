//! Core data models used throughout assis.
//!
//! These types represent the chunks, stored records, and retrieval matches
//! that flow through the indexing and query pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse document-source tag used for retrieval-time filtering.
///
/// Serialized as the lowercase name (`config`, `manpage`, `home`), which is
/// also the value stored under the `type` metadata key and the prefix of
/// every chunk id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// System configuration files under `/etc`.
    Config,
    /// Compressed manual pages.
    Manpage,
    /// Documents and dotfiles from the home directory.
    Home,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Config, Category::Manpage, Category::Home];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Config => "config",
            Category::Manpage => "manpage",
            Category::Home => "home",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config" => Ok(Category::Config),
            "manpage" => Ok(Category::Manpage),
            "home" => Ok(Category::Home),
            other => Err(format!(
                "unknown category '{}'. Must be config, manpage, or home.",
                other
            )),
        }
    }
}

/// A contiguous slice of a source document's text, ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// `{category}_{sanitizedPath}_{chunkIndex}`; stable across runs.
    pub id: String,
    pub text: String,
    pub source_path: String,
    pub chunk_index: usize,
    /// SHA-256 of the whole source document, shared by all of its chunks.
    pub content_hash: String,
    pub category: Category,
}

impl DocumentChunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source_path.clone(),
            chunk_index: self.chunk_index as i64,
            file_hash: self.content_hash.clone(),
            category: self.category,
        }
    }
}

/// Metadata persisted next to every vector: `{source, chunk_index, file_hash, type}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_index: i64,
    pub file_hash: String,
    #[serde(rename = "type")]
    pub category: Category,
}

/// A record as returned by a `get` against the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// One ranked result of a nearest-neighbour query.
///
/// Lower `distance` means more similar; the metric is whatever the store's
/// collection was configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalMatch {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub distance: f64,
}

/// Restricts `query`, `get` and `delete` to records whose metadata matches.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub category: Option<Category>,
    /// Match any of these `source` paths. Empty means no restriction.
    pub sources: Vec<String>,
}

impl RecordFilter {
    pub fn category(category: Option<Category>) -> Self {
        Self {
            category,
            sources: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.sources.is_empty()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(category) = self.category {
            if metadata.category != category {
                return false;
            }
        }
        self.sources.is_empty() || self.sources.iter().any(|s| *s == metadata.source)
    }
}
