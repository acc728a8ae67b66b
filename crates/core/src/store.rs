use crate::config::{StoreConfig, VectorBackend};
use crate::stores::{LocalVectorStore, QdrantStore};
use crate::traits::VectorStore;
use crate::StoreError;
use std::sync::Arc;
use tracing::info;

/// Opens the configured backend. Called once per ingestion run or server start.
pub async fn open_vector_store(
    config: &StoreConfig,
    dimensions: usize,
) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.backend {
        VectorBackend::Local => {
            info!(directory = %config.persist_directory.display(), "opening local vector store");
            let store = LocalVectorStore::open(&config.persist_directory, dimensions).await?;
            Ok(Arc::new(store))
        }
        VectorBackend::Qdrant => {
            info!(url = %config.qdrant_url, collection = %config.collection, "opening qdrant collection");
            let store = QdrantStore::new(config.qdrant_url.as_str(), &config.collection, dimensions);
            store.ensure_collection().await?;
            Ok(Arc::new(store))
        }
    }
}
