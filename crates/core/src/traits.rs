use crate::watsonx::{Generation, GenerationParameters};
use crate::{DocumentChunk, InferenceError, SearchHit, StoreError};
use async_trait::async_trait;

/// Append-only embedding index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists `chunks` with their `embeddings`, pairwise by position.
    async fn add(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<(), StoreError>;

    /// Top `k` chunks by similarity, best first.
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        parameters: &GenerationParameters,
    ) -> Result<Generation, InferenceError>;
}
