use crate::chunking::chunk_pages;
use crate::config::IngestSettings;
use crate::embeddings::Embedder;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ledger::IngestLedger;
use crate::traits::VectorStore;
use crate::{ChunkingOptions, DocumentChunk, IngestError};
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// File names ending in lowercase `.pdf` directly inside `folder`.
pub fn discover_pdf_files(folder: &Path) -> BTreeSet<String> {
    WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "pdf")
        })
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect()
}

/// Files present on disk but not yet in the ledger, in processing order.
pub fn pending_files(all: &BTreeSet<String>, ingested: &BTreeSet<String>) -> Vec<String> {
    all.difference(ingested).cloned().collect()
}

pub fn load_and_chunk(
    path: &Path,
    extractor: &dyn PdfExtractor,
    options: &ChunkingOptions,
) -> Result<Vec<DocumentChunk>, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let pages = extractor.extract_pages(path)?;
    Ok(chunk_pages(name, &pages, options))
}

/// Embedding model and vector store, opened only when there is work to do.
pub struct IngestBackends {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPdf {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub ingested: Vec<String>,
    pub skipped: Vec<SkippedPdf>,
    pub chunks_added: usize,
    pub total_documents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    MissingDirectory(PathBuf),
    NothingToDo,
    Completed(IngestionReport),
}

pub struct IngestionPipeline {
    data_dir: PathBuf,
    ledger: IngestLedger,
    options: ChunkingOptions,
    extractor: Box<dyn PdfExtractor>,
}

impl IngestionPipeline {
    pub fn new(settings: &IngestSettings) -> Self {
        Self::with_extractor(settings, Box::new(LopdfExtractor))
    }

    pub fn with_extractor(settings: &IngestSettings, extractor: Box<dyn PdfExtractor>) -> Self {
        Self {
            data_dir: settings.data_dir.clone(),
            ledger: IngestLedger::new(&settings.ledger_path),
            options: settings.chunking.clone(),
            extractor,
        }
    }

    /// Ingests every PDF not yet in the ledger.
    ///
    /// `open_backends` runs at most once, and only when there are new files.
    /// A file that fails at any step is skipped and left out of the ledger so
    /// the next run retries it.
    pub async fn run<F, Fut>(&self, open_backends: F) -> Result<IngestionOutcome, IngestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IngestBackends, IngestError>>,
    {
        self.options.validate()?;

        if !self.data_dir.is_dir() {
            error!(data_dir = %self.data_dir.display(), "data directory not found");
            return Ok(IngestionOutcome::MissingDirectory(self.data_dir.clone()));
        }

        let ingested = self.ledger.ingested_files()?;
        let all = discover_pdf_files(&self.data_dir);
        let pending = pending_files(&all, &ingested);

        if pending.is_empty() {
            info!("No new PDF files to ingest.");
            return Ok(IngestionOutcome::NothingToDo);
        }

        info!(count = pending.len(), files = ?pending, "found new PDF files to ingest");
        let backends = open_backends().await?;

        let mut report = IngestionReport {
            ingested: Vec::new(),
            skipped: Vec::new(),
            chunks_added: 0,
            total_documents: 0,
        };

        for name in pending {
            match self.ingest_file(&name, &backends).await {
                Ok(chunk_count) => {
                    info!(file = %name, chunks = chunk_count, "ingested pdf");
                    report.chunks_added += chunk_count;
                    report.ingested.push(name);
                }
                Err(error) => {
                    warn!(file = %name, reason = %error, "skipping pdf");
                    report.skipped.push(SkippedPdf {
                        file_name: name,
                        reason: error.to_string(),
                    });
                }
            }
        }

        report.total_documents = backends.store.count().await?;
        info!(
            ingested = report.ingested.len(),
            skipped = report.skipped.len(),
            total_documents = report.total_documents,
            "ingestion complete"
        );

        Ok(IngestionOutcome::Completed(report))
    }

    async fn ingest_file(&self, name: &str, backends: &IngestBackends) -> Result<usize, IngestError> {
        let path = self.data_dir.join(name);
        let chunks = load_and_chunk(&path, self.extractor.as_ref(), &self.options)?;

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let embeddings = backends.embedder.embed_batch(&texts).await?;
        backends.store.add(&chunks, &embeddings).await?;

        self.ledger.log_ingested_file(name)?;
        Ok(chunks.len())
    }
}
