//! Error types for the indexing and query pipeline.
//!
//! Every stage returns its own typed error so failures can be logged,
//! counted and inspected per document or per batch. Command-level code
//! wraps these in `anyhow` with context before reporting them.

use std::path::PathBuf;
use thiserror::Error;

/// A candidate document could not be read or decoded.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decompress {}: {source}", .path.display())]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::Io { path, .. } | LoadError::Decompress { path, .. } => path,
        }
    }
}

/// The embedding collaborator failed for a whole batch.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled; set [embedding] provider in config")]
    Disabled,

    #[error("embedding service unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("embedding API error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding backend failed: {0}")]
    Backend(String),
}

/// The vector store rejected or could not serve a request.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector store unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("vector store error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid vector store response: {0}")]
    InvalidResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True when the store could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unreachable { .. })
    }
}

/// Query-time failure: the query could not be embedded or searched.
#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The external model process could not be run.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to start model process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("model process I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
