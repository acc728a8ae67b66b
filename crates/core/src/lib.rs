pub mod agent;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod ledger;
pub mod listings;
pub mod models;
pub mod runtime;
pub mod server;
pub mod store;
pub mod stores;
pub mod tools;
pub mod traits;
pub mod watsonx;

#[cfg(test)]
mod test_support;

pub use agent::{parse_step, AgentStep, ChatAgent, ITERATION_LIMIT_ANSWER};
pub use chunking::{chunk_pages, normalize_whitespace, split_text};
pub use config::{
    AgentSettings, AppConfig, EmbeddingProvider, EmbeddingSettings, IngestSettings,
    ListingsSettings, StoreConfig, VectorBackend, WatsonxSettings,
};
pub use embeddings::{
    build_embedder, local_model_dimensions, CharacterNgramEmbedder, Embedder, WatsonxEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
#[cfg(feature = "local-embeddings")]
pub use embeddings::LocalEmbedder;
pub use error::{AgentError, ConfigError, InferenceError, IngestError, StoreError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    discover_pdf_files, load_and_chunk, pending_files, IngestBackends, IngestionOutcome,
    IngestionPipeline, IngestionReport, SkippedPdf,
};
pub use ledger::IngestLedger;
pub use listings::{parse_listing_query, ListingsClient, ListingsQuery};
pub use models::{ChunkingOptions, DocumentChunk, SearchHit, StoredChunk};
pub use runtime::{open_ingest_backends, ChatRuntime, Clients};
pub use server::{router, serve, AppState};
pub use store::open_vector_store;
pub use stores::{LocalVectorStore, QdrantStore};
pub use tools::{DocumentSearchTool, ListingsTool, Tool, ToolRegistry};
pub use traits::{TextGenerator, VectorStore};
pub use watsonx::{Generation, GenerationParameters, WatsonxAuth, WatsonxClient};
