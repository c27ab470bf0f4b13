//! Indexing pipeline: select → load → chunk → embed → upsert.
//!
//! Loading and chunking run on a bounded rayon pool as a pure function per
//! path ([`process_path`]); every outcome, including failures, comes back
//! to the coordinator as a value. The coordinator then embeds and upserts
//! the collected chunks serially, one batch at a time.
//!
//! No document- or batch-level failure aborts the run. Failures are logged
//! and recorded in the returned [`IndexReport`]; re-running is idempotent
//! because records are keyed by stable chunk ids.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk::build_chunks;
use crate::config::{ChunkingConfig, Config, IndexingConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{EmbeddingError, LoadError, StoreError};
use crate::load::load;
use crate::models::{Category, DocumentChunk, RecordFilter};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress, ProgressMode};
use crate::select::FileSelector;
use crate::store::{open_store, UpsertBatch, VectorStore};

/// Chunks produced from one successfully loaded path.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSource {
    pub path: String,
    pub chunks: Vec<DocumentChunk>,
}

/// Load and chunk a single path. Pure apart from reading the file.
pub fn process_path(
    path: &Path,
    category: Category,
    max_lines: usize,
) -> Result<LoadedSource, LoadError> {
    let doc = load(path)?;
    let source = path.to_string_lossy().into_owned();
    let chunks = build_chunks(category, &source, &doc.text, &doc.content_hash, max_lines);
    Ok(LoadedSource {
        path: source,
        chunks,
    })
}

/// Run [`process_path`] over `paths` on a pool of `workers` threads.
///
/// Results come back in input order.
pub fn load_all(
    paths: &[PathBuf],
    category: Category,
    max_lines: usize,
    workers: usize,
) -> Result<Vec<Result<LoadedSource, LoadError>>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;
    Ok(pool.install(|| {
        paths
            .par_iter()
            .map(|path| process_path(path, category, max_lines))
            .collect()
    }))
}

/// One recorded failure inside an indexing run.
#[derive(Debug)]
pub enum IndexFailure {
    Load(LoadError),
    Embedding { batch: usize, error: EmbeddingError },
    Store { batch: usize, error: StoreError },
    Prune { source: String, error: StoreError },
}

impl fmt::Display for IndexFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexFailure::Load(e) => write!(f, "load: {}", e),
            IndexFailure::Embedding { batch, error } => {
                write!(f, "batch {}: embedding failed: {}", batch, error)
            }
            IndexFailure::Store { batch, error } => {
                write!(f, "batch {}: upsert failed: {}", batch, error)
            }
            IndexFailure::Prune { source, error } => {
                write!(f, "prune {}: {}", source, error)
            }
        }
    }
}

/// Outcome of [`Indexer::index_batch`].
#[derive(Debug)]
pub struct IndexReport {
    pub category: Category,
    pub documents_processed: usize,
    pub documents_failed: usize,
    pub chunks_produced: usize,
    pub chunks_indexed: usize,
    pub batches: usize,
    pub errors: Vec<IndexFailure>,
}

impl IndexReport {
    fn new(category: Category) -> Self {
        Self {
            category,
            documents_processed: 0,
            documents_failed: 0,
            chunks_produced: 0,
            chunks_indexed: 0,
            batches: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "index {}", self.category)?;
        writeln!(f, "  documents loaded: {}", self.documents_processed)?;
        writeln!(f, "  documents failed: {}", self.documents_failed)?;
        writeln!(f, "  chunks produced: {}", self.chunks_produced)?;
        writeln!(f, "  chunks indexed: {}", self.chunks_indexed)?;
        writeln!(f, "  batches: {}", self.batches)?;
        if !self.errors.is_empty() {
            writeln!(f, "  errors: {}", self.errors.len())?;
            for error in &self.errors {
                writeln!(f, "    - {}", error)?;
            }
        }
        Ok(())
    }
}

/// Knobs for one [`Indexer`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub workers: usize,
    pub batch_size: usize,
    pub prune_stale: bool,
    pub chunking: ChunkingConfig,
}

impl IndexOptions {
    pub fn from_config(indexing: &IndexingConfig, chunking: &ChunkingConfig) -> Self {
        Self {
            workers: indexing.workers,
            batch_size: indexing.batch_size,
            prune_stale: indexing.prune_stale,
            chunking: chunking.clone(),
        }
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::from_config(&IndexingConfig::default(), &ChunkingConfig::default())
    }
}

/// Coordinates loading on the worker pool and serial embed/upsert.
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    options: IndexOptions,
    reporter: Box<dyn IndexProgressReporter>,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        options: IndexOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            options,
            reporter: Box::new(NoProgress),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn IndexProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Load, chunk, embed and upsert `paths` as `category` records.
    ///
    /// Only a failure to run the worker pool itself is returned as an error.
    pub async fn index_batch(&self, paths: Vec<PathBuf>, category: Category) -> Result<IndexReport> {
        let mut report = IndexReport::new(category);
        let max_lines = self.options.chunking.max_lines_for(category);
        let workers = self.options.workers;

        let outcomes =
            tokio::task::spawn_blocking(move || load_all(&paths, category, max_lines, workers))
                .await
                .context("worker pool panicked")??;

        let mut chunks = Vec::new();
        let mut empty_sources = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(source) => {
                    report.documents_processed += 1;
                    if source.chunks.is_empty() {
                        empty_sources.push(source.path);
                    } else {
                        chunks.extend(source.chunks);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %e.path().display(), error = %e, "skipping document");
                    report.documents_failed += 1;
                    report.errors.push(IndexFailure::Load(e));
                }
            }
        }
        report.chunks_produced = chunks.len();
        self.reporter.report(IndexProgressEvent::Loaded {
            category,
            files: report.documents_processed as u64,
            chunks: chunks.len() as u64,
        });

        let total = chunks.len() as u64;
        let mut done = 0u64;
        let mut seen: HashSet<String> = HashSet::new();

        for (batch_index, batch) in chunks.chunks(self.options.batch_size.max(1)).enumerate() {
            report.batches += 1;
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let fresh: Vec<String> = batch
                .iter()
                .filter(|c| seen.insert(c.source_path.clone()))
                .map(|c| c.source_path.clone())
                .collect();

            match self.embedder.embed(&texts).await {
                Ok(vectors) => {
                    if self.options.prune_stale {
                        self.prune(&fresh, &mut report).await;
                    }
                    let upsert = match UpsertBatch::from_chunks(batch, vectors) {
                        Ok(upsert) => self.store.upsert(&upsert).await,
                        Err(e) => Err(e),
                    };
                    match upsert {
                        Ok(()) => report.chunks_indexed += batch.len(),
                        Err(error) => {
                            tracing::warn!(batch = batch_index, %error, "batch upsert failed");
                            report.errors.push(IndexFailure::Store {
                                batch: batch_index,
                                error,
                            });
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(batch = batch_index, %error, "batch embedding failed");
                    report.errors.push(IndexFailure::Embedding {
                        batch: batch_index,
                        error,
                    });
                }
            }

            done += batch.len() as u64;
            self.reporter.report(IndexProgressEvent::Indexing {
                category,
                n: done,
                total,
            });
        }

        if self.options.prune_stale && !empty_sources.is_empty() {
            self.prune(&empty_sources, &mut report).await;
        }

        tracing::info!(
            category = %category,
            documents = report.documents_processed,
            failed = report.documents_failed,
            chunks = report.chunks_indexed,
            "index finished"
        );
        Ok(report)
    }

    /// Delete every record previously stored for `sources`.
    async fn prune(&self, sources: &[String], report: &mut IndexReport) {
        if sources.is_empty() {
            return;
        }
        // Another category may hold records for the same path.
        let filter = RecordFilter {
            category: Some(report.category),
            sources: sources.to_vec(),
        };
        if let Err(error) = self.store.delete(&filter).await {
            tracing::warn!(%error, count = sources.len(), "failed to prune stale records");
            let source = if sources.len() == 1 {
                sources[0].clone()
            } else {
                format!("{} and {} more", sources[0], sources.len() - 1)
            };
            report.errors.push(IndexFailure::Prune { source, error });
        }
    }
}

/// Which sources `assis index` should walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum IndexSelection {
    Config,
    Manpage,
    Home,
    All,
}

impl IndexSelection {
    pub fn categories(&self) -> Vec<Category> {
        match self {
            IndexSelection::Config => vec![Category::Config],
            IndexSelection::Manpage => vec![Category::Manpage],
            IndexSelection::Home => vec![Category::Home],
            IndexSelection::All => Category::ALL.to_vec(),
        }
    }
}

/// `assis index`: walk the selected sources and index them.
pub async fn run_index(config: &Config, selection: IndexSelection, progress: ProgressMode) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let store = open_store(&config.store)
        .await
        .context("cannot open vector store")?;

    let indexer = Indexer::new(
        embedder,
        Arc::clone(&store),
        IndexOptions::from_config(&config.indexing, &config.chunking),
    )
    .with_reporter(progress.reporter());

    let mut failures = 0;
    for category in selection.categories() {
        let source = config.sources.resolve(category);
        let selector = FileSelector::new(&source)
            .with_context(|| format!("invalid source configuration for {}", category))?;

        indexer.reporter.report(IndexProgressEvent::Selecting { category });
        let paths: Vec<PathBuf> =
            tokio::task::spawn_blocking(move || selector.select().collect::<Vec<_>>())
                .await
                .context("file selection panicked")?;
        tracing::debug!(category = %category, files = paths.len(), "selected files");

        let report = indexer.index_batch(paths, category).await?;
        failures += report.errors.len();
        print!("{}", report);
    }

    let total = store
        .count()
        .await
        .context("cannot count records in vector store")?;
    println!("total records: {}", total);
    if failures == 0 {
        println!("ok");
    } else {
        println!("done with {} errors", failures);
    }
    Ok(())
}
