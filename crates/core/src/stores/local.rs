use crate::models::{DocumentChunk, SearchHit, StoredChunk};
use crate::traits::VectorStore;
use crate::StoreError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

pub const RECORDS_FILE: &str = "chunks.jsonl";

/// Chunks appended as JSON lines under the persist directory, mirrored in memory.
pub struct LocalVectorStore {
    path: PathBuf,
    dimensions: usize,
    records: RwLock<Vec<StoredChunk>>,
}

impl LocalVectorStore {
    /// Opens the store in `directory`, creating it when absent. Every stored
    /// vector must have `dimensions` components.
    pub async fn open(directory: impl AsRef<Path>, dimensions: usize) -> Result<Self, StoreError> {
        let directory = directory.as_ref();
        tokio::fs::create_dir_all(directory).await?;
        let path = directory.join(RECORDS_FILE);

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str::<StoredChunk>)
                .collect::<Result<Vec<_>, _>>()?,
            Err(error) if error.kind() == ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(error.into()),
        };

        if let Some(record) = records.iter().find(|record| record.embedding.len() != dimensions) {
            return Err(StoreError::Request(format!(
                "{} holds {}-dimensional embeddings but the embedder produces {}",
                path.display(),
                record.embedding.len(),
                dimensions
            )));
        }

        debug!(path = %path.display(), records = records.len(), dimensions, "opened local vector store");

        Ok(Self {
            path,
            dimensions,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::Request(format!(
                "embedding dimension {} != {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_a * norm_b))
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<(), StoreError> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        if chunks.is_empty() {
            return Ok(());
        }

        let mut records = self.records.write().await;
        let mut lines = String::new();
        let mut stored = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            self.check_dimensions(embedding)?;

            let record = StoredChunk {
                chunk: chunk.clone(),
                embedding: embedding.clone(),
            };
            lines.push_str(&serde_json::to_string(&record)?);
            lines.push('\n');
            stored.push(record);
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;

        records.extend(stored);
        Ok(())
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.check_dimensions(query_vector)?;
        let records = self.records.read().await;

        let mut scored: Vec<(f64, &StoredChunk)> = records
            .iter()
            .map(|record| (cosine_similarity(query_vector, &record.embedding), record))
            .collect();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, record)| SearchHit {
                chunk_id: record.chunk.chunk_id.clone(),
                source: record.chunk.source.clone(),
                page: record.chunk.page,
                score,
                text: record.chunk.text.clone(),
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.read().await.len() as u64)
    }
}
