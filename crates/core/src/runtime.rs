//! Wires configured components together for the binary's subcommands.

use crate::agent::ChatAgent;
use crate::config::AppConfig;
use crate::embeddings::{build_embedder, Embedder};
use crate::ingest::IngestBackends;
use crate::listings::ListingsClient;
use crate::store::open_vector_store;
use crate::tools::{DocumentSearchTool, ListingsTool, ToolRegistry};
use crate::watsonx::{WatsonxAuth, WatsonxClient};
use crate::IngestError;
use reqwest::Client;
use std::sync::Arc;

/// Clients that share one HTTP connection pool and one watsonx token cache.
pub struct Clients {
    pub http: Client,
    pub auth: Arc<WatsonxAuth>,
}

impl Clients {
    pub fn new(config: &AppConfig) -> Self {
        let http = Client::new();
        let auth = Arc::new(WatsonxAuth::new(config.watsonx.clone(), http.clone()));
        Self { http, auth }
    }

    pub fn embedder(&self, config: &AppConfig) -> Result<Arc<dyn Embedder>, IngestError> {
        Ok(build_embedder(&config.embedding, Arc::clone(&self.auth), self.http.clone())?)
    }
}

pub async fn open_ingest_backends(config: &AppConfig) -> Result<IngestBackends, IngestError> {
    let clients = Clients::new(config);
    let embedder = clients.embedder(config)?;
    let store = open_vector_store(&config.store, embedder.dimensions()).await?;
    Ok(IngestBackends { embedder, store })
}

pub struct ChatRuntime {
    pub generator: Arc<WatsonxClient>,
    pub agent: Arc<ChatAgent>,
}

impl ChatRuntime {
    /// Opens the vector store once and builds the agent with both tools.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let clients = Clients::new(config);
        let generator = Arc::new(WatsonxClient::with_auth(
            Arc::clone(&clients.auth),
            clients.http.clone(),
        )?);

        let embedder = clients.embedder(config)?;
        let store = open_vector_store(&config.store, embedder.dimensions()).await?;
        let listings = Arc::new(ListingsClient::new(
            config.listings.clone(),
            clients.http.clone(),
        ));

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(DocumentSearchTool::new(
            embedder,
            store,
            config.agent.search_top_k,
        )));
        tools.register(Arc::new(ListingsTool::new(listings)));

        let agent = Arc::new(ChatAgent::new(
            generator.clone(),
            tools,
            config.agent.max_iterations,
        ));

        Ok(Self { generator, agent })
    }
}
