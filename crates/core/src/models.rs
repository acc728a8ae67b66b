use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub source: String,
    pub page: u32,
    pub chunk_index: u64,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

/// A chunk with its embedding, as persisted by a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    #[serde(flatten)]
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source: String,
    pub page: u32,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            separators: ["\n\n", "\n", " ", ""]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl ChunkingOptions {
    pub fn validate(&self) -> Result<(), crate::IngestError> {
        if self.chunk_size == 0 {
            return Err(crate::IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(crate::IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}
