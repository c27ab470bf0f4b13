use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use assis::config::SourceConfig;
use assis::embedding::Embedder;
use assis::error::{EmbeddingError, StoreError};
use assis::index::{IndexFailure, IndexOptions, Indexer};
use assis::models::{Category, RecordFilter, RetrievalMatch, StoredRecord};
use assis::retrieve::{RetrievalKind, Retriever};
use assis::select::FileSelector;
use assis::store::{InMemoryStore, Space, UpsertBatch, VectorStore};

/// Letter-frequency vectors: deterministic and similar texts land close.
struct LetterEmbedder;

fn letters(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains("FAIL_EMBED")) {
            return Err(EmbeddingError::Backend("refused".to_string()));
        }
        Ok(texts.iter().map(|t| letters(t)).collect())
    }
}

/// In-memory store that rejects batches containing a marker.
struct FlakyStore {
    inner: InMemoryStore,
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn upsert(&self, batch: &UpsertBatch) -> Result<(), StoreError> {
        if batch.documents.iter().any(|d| d.contains("FAIL_STORE")) {
            return Err(StoreError::Http {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.inner.upsert(batch).await
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &RecordFilter,
    ) -> Result<Vec<RetrievalMatch>, StoreError> {
        self.inner.query(embedding, top_k, filter).await
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.get(filter).await
    }

    async fn delete(&self, filter: &RecordFilter) -> Result<(), StoreError> {
        self.inner.delete(filter).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}

fn write_lines(path: &Path, n: usize, word: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let lines: Vec<String> = (0..n).map(|i| format!("{} line {}", word, i)).collect();
    fs::write(path, lines.join("\n")).unwrap();
}

fn indexer(store: Arc<dyn VectorStore>, batch_size: usize) -> Indexer {
    let options = IndexOptions {
        batch_size,
        workers: 4,
        ..IndexOptions::default()
    };
    Indexer::new(Arc::new(LetterEmbedder), store, options)
}

fn home_source(root: &Path) -> SourceConfig {
    SourceConfig {
        roots: vec![root.to_path_buf()],
        ..SourceConfig::default_for(Category::Home)
    }
}

fn select(source: &SourceConfig) -> Vec<PathBuf> {
    FileSelector::new(source).unwrap().select().collect()
}

fn sorted(mut records: Vec<StoredRecord>) -> Vec<StoredRecord> {
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
}

#[tokio::test]
async fn reindexing_unchanged_files_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    write_lines(&tmp.path().join("notes/a.txt"), 25, "alpha");
    write_lines(&tmp.path().join("notes/b.txt"), 3, "bravo");

    let store = Arc::new(InMemoryStore::default());
    let indexer = indexer(store.clone(), 256);
    let paths = select(&home_source(tmp.path()));
    assert_eq!(paths.len(), 2);

    let first = indexer.index_batch(paths.clone(), Category::Home).await.unwrap();
    assert!(first.is_clean());
    assert_eq!(first.documents_processed, 2);
    assert_eq!(first.chunks_produced, 3);
    assert_eq!(first.chunks_indexed, 3);
    let before = sorted(store.get(&RecordFilter::default()).await.unwrap());

    let second = indexer.index_batch(paths, Category::Home).await.unwrap();
    assert!(second.is_clean());
    let after = sorted(store.get(&RecordFilter::default()).await.unwrap());

    assert_eq!(before, after);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn shrinking_a_file_prunes_its_stale_chunks() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("long.txt");
    write_lines(&path, 45, "alpha");
    write_lines(&tmp.path().join("other.txt"), 5, "bravo");

    let store = Arc::new(InMemoryStore::default());
    let indexer = indexer(store.clone(), 2);
    let paths = select(&home_source(tmp.path()));

    indexer.index_batch(paths.clone(), Category::Home).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 4);

    write_lines(&path, 10, "alpha");
    let report = indexer.index_batch(paths, Category::Home).await.unwrap();
    assert!(report.is_clean());

    let source = path.to_string_lossy().into_owned();
    let remaining = store
        .get(&RecordFilter {
            category: None,
            sources: vec![source],
        })
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].metadata.chunk_index, 0);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn emptied_file_loses_all_records() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("gone.txt");
    write_lines(&path, 5, "alpha");

    let store = Arc::new(InMemoryStore::default());
    let indexer = indexer(store.clone(), 256);
    indexer.index_batch(vec![path.clone()], Category::Home).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);

    fs::write(&path, "   \n\n").unwrap();
    let report = indexer.index_batch(vec![path], Category::Home).await.unwrap();
    assert_eq!(report.chunks_produced, 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn reindexing_one_category_keeps_another_categorys_records() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("shared.conf");
    write_lines(&path, 5, "alpha");

    let store = Arc::new(InMemoryStore::default());
    let indexer = indexer(store.clone(), 256);
    indexer.index_batch(vec![path.clone()], Category::Config).await.unwrap();
    let report = indexer.index_batch(vec![path.clone()], Category::Home).await.unwrap();
    assert!(report.is_clean());

    let config = store
        .get(&RecordFilter::category(Some(Category::Config)))
        .await
        .unwrap();
    let home = store
        .get(&RecordFilter::category(Some(Category::Home)))
        .await
        .unwrap();
    assert_eq!(config.len(), 1);
    assert_eq!(home.len(), 1);

    // Emptying the file and reindexing as home leaves the config copy alone.
    fs::write(&path, "\n").unwrap();
    indexer.index_batch(vec![path], Category::Home).await.unwrap();
    assert_eq!(
        store
            .get(&RecordFilter::category(Some(Category::Config)))
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn unreadable_paths_are_counted_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let good = tmp.path().join("good.txt");
    write_lines(&good, 3, "alpha");
    let corrupt = tmp.path().join("broken.gz");
    fs::write(&corrupt, [0x1f, 0x8b, 0x08, 0x00, 0x01, 0x02]).unwrap();

    let store = Arc::new(InMemoryStore::default());
    let report = indexer(store.clone(), 256)
        .index_batch(
            vec![good, tmp.path().join("vanished.txt"), corrupt],
            Category::Config,
        )
        .await
        .unwrap();

    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.documents_failed, 2);
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(
        report
            .errors
            .iter()
            .filter(|e| matches!(e, IndexFailure::Load(_)))
            .count(),
        2
    );
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn failed_embedding_batch_does_not_stop_the_run() {
    let tmp = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = ["a", "b", "c"]
        .iter()
        .map(|name| tmp.path().join(name))
        .collect();
    write_lines(&paths[0], 2, "alpha");
    write_lines(&paths[1], 2, "FAIL_EMBED");
    write_lines(&paths[2], 2, "charlie");

    let store = Arc::new(InMemoryStore::default());
    let report = indexer(store.clone(), 1)
        .index_batch(paths, Category::Home)
        .await
        .unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.chunks_produced, 3);
    assert_eq!(report.chunks_indexed, 2);
    assert!(matches!(
        report.errors.as_slice(),
        [IndexFailure::Embedding { batch: 1, .. }]
    ));
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn failed_upsert_batch_does_not_stop_the_run() {
    let tmp = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = ["a", "b", "c"]
        .iter()
        .map(|name| tmp.path().join(name))
        .collect();
    write_lines(&paths[0], 2, "FAIL_STORE");
    write_lines(&paths[1], 2, "bravo");
    write_lines(&paths[2], 2, "charlie");

    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::default(),
    });
    let report = indexer(store.clone(), 1)
        .index_batch(paths, Category::Home)
        .await
        .unwrap();

    assert_eq!(report.chunks_indexed, 2);
    assert!(matches!(
        report.errors.as_slice(),
        [IndexFailure::Store { batch: 0, .. }]
    ));
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn excluded_directories_never_reach_the_store() {
    let tmp = TempDir::new().unwrap();
    write_lines(&tmp.path().join("notes/todo.txt"), 2, "alpha");
    write_lines(&tmp.path().join(".cache/thumbs/big.txt"), 2, "bravo");
    write_lines(&tmp.path().join("Code/User/settings.json"), 2, "charlie");
    write_lines(&tmp.path().join("notes/.secret"), 2, "delta");

    let store = Arc::new(InMemoryStore::default());
    let paths = select(&home_source(tmp.path()));
    indexer(store.clone(), 256)
        .index_batch(paths, Category::Home)
        .await
        .unwrap();

    let records = store.get(&RecordFilter::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].metadata.source.ends_with("notes/todo.txt"));
}

#[tokio::test]
async fn manual_pages_are_decompressed_and_chunked_by_forty() {
    let tmp = TempDir::new().unwrap();
    let man1 = tmp.path().join("man1");
    fs::create_dir_all(&man1).unwrap();
    let page: Vec<String> = (0..50).map(|i| format!(".TH LS 1 line {}", i)).collect();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(page.join("\n").as_bytes()).unwrap();
    fs::write(man1.join("ls.1.gz"), encoder.finish().unwrap()).unwrap();
    fs::write(man1.join("README"), "not a page").unwrap();

    let source = SourceConfig {
        roots: vec![tmp.path().to_path_buf()],
        ..SourceConfig::default_for(Category::Manpage)
    };
    let paths = select(&source);
    assert_eq!(paths.len(), 1);

    let store = Arc::new(InMemoryStore::default());
    let report = indexer(store.clone(), 256)
        .index_batch(paths, Category::Manpage)
        .await
        .unwrap();
    assert_eq!(report.chunks_indexed, 2);

    let records = store
        .get(&RecordFilter::category(Some(Category::Manpage)))
        .await
        .unwrap();
    let first = records
        .iter()
        .find(|r| r.metadata.chunk_index == 0)
        .unwrap();
    assert_eq!(first.document.lines().count(), 40);
    assert!(first.id.starts_with("manpage_"));
    assert!(first.id.ends_with("_man1_ls.1.gz_0"));
}

#[tokio::test]
async fn retrieval_over_indexed_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("fstab"), "zzz zzz zzz").unwrap();
    fs::write(tmp.path().join("hosts"), "aaa bbb").unwrap();

    let store = Arc::new(InMemoryStore::new(Space::Cosine));
    let paths = select(&home_source(tmp.path()));
    indexer(store.clone(), 256)
        .index_batch(paths, Category::Config)
        .await
        .unwrap();

    let retriever = Retriever::new(Arc::new(LetterEmbedder), store.clone());

    let hit = retriever.retrieve("zzz", None, 8, 0.1).await.unwrap();
    assert_eq!(hit.kind, RetrievalKind::Relevant);
    assert_eq!(hit.matches.len(), 1);
    assert!(hit.context.starts_with("Source: "));
    assert!(hit.context.contains("zzz zzz zzz"));

    // Nothing shares letters with "qqq": fall back to the nearest record.
    let fallback = retriever.retrieve("qqq", None, 8, 0.1).await.unwrap();
    assert_eq!(fallback.kind, RetrievalKind::Fallback);
    assert_eq!(fallback.matches.len(), 1);

    let filtered = retriever
        .retrieve("zzz", Some(Category::Home), 8, 0.1)
        .await
        .unwrap();
    assert_eq!(filtered.kind, RetrievalKind::Empty);
    assert!(filtered.context.is_empty());
}
