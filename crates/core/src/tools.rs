use crate::chunking::normalize_whitespace;
use crate::embeddings::Embedder;
use crate::listings::ListingsClient;
use crate::traits::VectorStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub const DOCUMENT_SEARCH: &str = "document_search";
pub const LISTINGS_SEARCH: &str = "listings_search";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(&self, input: &str) -> String;
}

pub struct DocumentSearchTool {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl DocumentSearchTool {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        DOCUMENT_SEARCH
    }

    fn description(&self) -> &str {
        "Searches the ingested legal and housing documents. Input is a plain-language question or keywords."
    }

    async fn call(&self, input: &str) -> String {
        info!(query = input, "document_search tool called");

        let query_vector = match self.embedder.embed(input).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(%error, "query embedding failed");
                return format!("Error searching documents: {error}");
            }
        };

        match self.store.search(&query_vector, self.top_k).await {
            Ok(hits) if hits.is_empty() => "No matching documents found.".to_string(),
            Ok(hits) => hits
                .iter()
                .map(|hit| format!("[{} p.{}] {}", hit.source, hit.page, normalize_whitespace(&hit.text)))
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(error) => {
                warn!(%error, "document search failed");
                format!("Error searching documents: {error}")
            }
        }
    }
}

pub struct ListingsTool {
    client: Arc<ListingsClient>,
}

impl ListingsTool {
    pub fn new(client: Arc<ListingsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ListingsTool {
    fn name(&self) -> &str {
        LISTINGS_SEARCH
    }

    fn description(&self) -> &str {
        "Looks up rental listings. Input is comma-separated key=value pairs, e.g. city=Austin,state=TX,bedrooms=2,bathrooms=1,postal_code=78701."
    }

    async fn call(&self, input: &str) -> String {
        info!(query = input, "listings_search tool called");
        self.client.search_listings(input).await
    }
}

/// Tools by name, kept in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any tool already registered under the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name).cloned()
    }

    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
    use crate::models::DocumentChunk;
    use crate::stores::LocalVectorStore;
    use chrono::Utc;
    use tempfile::tempdir;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "echoes"
        }

        async fn call(&self, input: &str) -> String {
            format!("{}:{input}", self.0)
        }
    }

    #[test]
    fn registry_replaces_tools_with_the_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("a")));
        registry.register(Arc::new(Echo("b")));
        registry.register(Arc::new(Echo("a")));

        assert_eq!(registry.names(), vec!["b", "a"]);
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn document_search_renders_sources() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        let store = LocalVectorStore::open(dir.path(), DEFAULT_EMBEDDING_DIMENSIONS).await?;
        let text = "Landlords must return the security deposit within 30 days.";
        store
            .add(
                &[DocumentChunk {
                    chunk_id: "1".to_string(),
                    source: "tenant-handbook.pdf".to_string(),
                    page: 4,
                    chunk_index: 0,
                    text: text.to_string(),
                    ingested_at: Utc::now(),
                }],
                &[embedder.embed_sync(text)],
            )
            .await?;

        let tool = DocumentSearchTool::new(Arc::new(embedder), Arc::new(store), 4);
        let observation = tool.call("security deposit").await;

        assert_eq!(observation, format!("[tenant-handbook.pdf p.4] {text}"));
        Ok(())
    }

    #[tokio::test]
    async fn document_search_on_empty_store() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), DEFAULT_EMBEDDING_DIMENSIONS).await?;
        let tool = DocumentSearchTool::new(
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(store),
            4,
        );

        assert_eq!(tool.call("anything").await, "No matching documents found.");
        Ok(())
    }
}
