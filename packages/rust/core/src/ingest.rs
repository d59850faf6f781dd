//! Offline ingestion: content store → documents → chunks → vector index.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use doki_extract::{ExtractOptions, Extractor};
use doki_shared::{AppConfig, Document, DokiError, Result};
use doki_storage::{ContentStore, IndexStats, VectorIndex};

use crate::chunker::{ChunkConfig, chunk_documents};
use crate::embedding::Embedder;
use crate::indexer::build_index;

/// Inputs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory of raw pages written by the crawler.
    pub content_dir: PathBuf,
    /// Directory holding the vector index database.
    pub index_dir: PathBuf,
    pub chunk: ChunkConfig,
    pub extract: ExtractOptions,
    /// Chunks per embedding request.
    pub batch_size: usize,
}

impl IngestConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            content_dir: config.paths.content_dir.clone(),
            index_dir: config.paths.index_dir.clone(),
            chunk: ChunkConfig::try_from(&config.chunking)?,
            extract: ExtractOptions::from(&config.extraction),
            batch_size: config.embedding.batch_size,
        })
    }
}

/// Outcome of a successful ingestion run.
#[derive(Debug)]
pub struct IngestReport {
    pub pages_found: usize,
    pub documents: usize,
    /// Pages that yielded no content.
    pub pages_skipped: Vec<String>,
    pub chunks: usize,
    pub index: IndexStats,
    pub elapsed: Duration,
}

/// Progress callback for reporting ingestion status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each stored page is processed by the extractor.
    fn page_extracted(&self, source: &str, current: usize, total: usize);
    /// Called after each embedding batch.
    fn chunks_embedded(&self, done: usize, total: usize);
    /// Called when ingestion completes.
    fn done(&self, report: &IngestReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_extracted(&self, _source: &str, _current: usize, _total: usize) {}
    fn chunks_embedded(&self, _done: usize, _total: usize) {}
    fn done(&self, _report: &IngestReport) {}
}

/// Rebuild the vector index from every page in the content store.
///
/// Aborts before opening the index when the store is empty or nothing can be
/// extracted, so an existing index is never replaced by an empty one.
#[instrument(skip_all, fields(content_dir = %config.content_dir.display(), index_dir = %config.index_dir.display()))]
pub async fn ingest(
    config: &IngestConfig,
    embedder: &dyn Embedder,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let start = Instant::now();

    progress.phase("Loading pages");
    let store = ContentStore::new(&config.content_dir);
    let pages = store.list_pages()?;
    if pages.is_empty() {
        let message = format!(
            "no HTML pages found in {}; run `doki crawl <url>` first",
            config.content_dir.display()
        );
        error!("{message}");
        return Err(DokiError::ingestion(message));
    }
    info!(pages = pages.len(), "loaded stored pages");

    progress.phase("Extracting content");
    let extractor = Extractor::new(config.extract.clone())?;
    let total = pages.len();
    let mut documents: Vec<Document> = Vec::with_capacity(total);
    let mut pages_skipped = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        match extractor.extract(&page.key, &page.body) {
            Some(doc) => documents.push(doc),
            None => {
                warn!(source = %page.key, "no content extracted, skipping page");
                pages_skipped.push(page.key.clone());
            }
        }
        progress.page_extracted(&page.key, i + 1, total);
    }
    if documents.is_empty() {
        let message = format!(
            "none of the {total} pages in {} yielded any text",
            config.content_dir.display()
        );
        error!("{message}");
        return Err(DokiError::ingestion(message));
    }

    progress.phase("Chunking");
    let chunks = chunk_documents(&documents, &config.chunk);
    info!(documents = documents.len(), chunks = chunks.len(), "chunked documents");

    progress.phase("Embedding");
    let index = VectorIndex::open(&config.index_dir).await?;
    let stats = build_index(&index, &chunks, embedder, config.batch_size, progress).await?;

    let report = IngestReport {
        pages_found: total,
        documents: documents.len(),
        pages_skipped,
        chunks: chunks.len(),
        index: stats,
        elapsed: start.elapsed(),
    };
    info!(
        records = report.index.record_count,
        skipped = report.pages_skipped.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "ingestion complete"
    );
    progress.done(&report);
    Ok(report)
}
