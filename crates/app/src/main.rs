use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rag_chat_core::config::{
    non_empty, parse_url, DEFAULT_EMBEDDINGS_MODEL, DEFAULT_IAM_URL, DEFAULT_MODEL_ID,
    DEFAULT_RENTCAST_URL, DEFAULT_WATSONX_URL,
};
use rag_chat_core::{
    open_ingest_backends, serve, AgentSettings, AppConfig, AppState, ChatRuntime,
    ChunkingOptions, EmbeddingProvider, EmbeddingSettings, IngestSettings, IngestionOutcome,
    IngestionPipeline, ListingsSettings, StoreConfig, VectorBackend, WatsonxSettings,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rag-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    watsonx: WatsonxArgs,

    #[command(flatten)]
    store: StoreArgs,

    /// RentCast API key
    #[arg(long, env = "RENTCAST_API_KEY", hide_env_values = true)]
    rentcast_api_key: Option<String>,

    /// RentCast listings endpoint
    #[arg(long, env = "RENTCAST_URL", default_value = DEFAULT_RENTCAST_URL)]
    rentcast_url: String,
}

#[derive(Args)]
struct WatsonxArgs {
    /// Bearer token for watsonx.ai
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// IBM Cloud API key, exchanged for a bearer token when no access token is set
    #[arg(long, env = "IBM_API_KEY", hide_env_values = true)]
    ibm_api_key: Option<String>,

    /// watsonx.ai project id
    #[arg(long, env = "PROJECT_ID")]
    project_id: Option<String>,

    /// Generation model id
    #[arg(long, env = "MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    model_id: String,

    /// watsonx.ai service base URL
    #[arg(long, env = "WATSONX_URL", default_value = DEFAULT_WATSONX_URL)]
    watsonx_url: String,

    /// IBM Cloud IAM base URL
    #[arg(long, env = "WATSONX_IAM_URL", default_value = DEFAULT_IAM_URL)]
    iam_url: String,
}

#[derive(Args)]
struct StoreArgs {
    /// Vector store backend: local or qdrant
    #[arg(long, env = "VECTOR_BACKEND", default_value = "local")]
    vector_backend: String,

    /// Directory of the local vector store
    #[arg(long, env = "PERSIST_DIRECTORY", default_value = "db")]
    persist_directory: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "documents")]
    qdrant_collection: String,

    /// Embedding provider: local, watsonx or ngram
    #[arg(long, env = "EMBEDDINGS_PROVIDER", default_value = "local")]
    embeddings_provider: String,

    /// Embedding model for the local and watsonx providers
    #[arg(long, env = "EMBEDDINGS_MODEL", default_value = DEFAULT_EMBEDDINGS_MODEL)]
    embeddings_model: String,

    /// Override the embedding dimension
    #[arg(long, env = "EMBEDDINGS_DIMENSIONS")]
    embeddings_dimensions: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest new PDFs from the data directory into the vector store.
    Ingest {
        /// Folder that contains the PDFs.
        #[arg(long, env = "DATA_DIR", default_value = "data")]
        data_dir: PathBuf,
        /// Ledger of already ingested file names.
        #[arg(long, env = "INGESTED_FILES_LOG", default_value = ".ingested_files")]
        ledger: PathBuf,
        /// Maximum characters per chunk.
        #[arg(long, default_value = "1000")]
        chunk_size: usize,
        /// Characters shared between neighbouring chunks.
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
    },
    /// Serve the /generate and /chat HTTP API.
    Serve {
        /// Address to bind.
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: String,
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Ask the chat agent a single question.
    Ask {
        /// Question for the agent.
        #[arg(long)]
        query: String,
        #[command(flatten)]
        agent: AgentArgs,
    },
}

#[derive(Args, Clone, Copy)]
struct AgentArgs {
    /// Maximum think/act/observe steps per question.
    #[arg(long, default_value = "6")]
    max_iterations: usize,
    /// Document chunks returned per search.
    #[arg(long, default_value = "4")]
    top_k: usize,
}

impl From<AgentArgs> for AgentSettings {
    fn from(args: AgentArgs) -> Self {
        Self {
            max_iterations: args.max_iterations,
            search_top_k: args.top_k,
        }
    }
}

impl Cli {
    fn app_config(&self) -> anyhow::Result<AppConfig> {
        let watsonx = WatsonxSettings {
            access_token: non_empty(self.watsonx.access_token.clone()),
            api_key: non_empty(self.watsonx.ibm_api_key.clone()),
            project_id: non_empty(self.watsonx.project_id.clone()),
            model_id: self.watsonx.model_id.clone(),
            base_url: parse_url("WATSONX_URL", &self.watsonx.watsonx_url)?,
            iam_url: parse_url("WATSONX_IAM_URL", &self.watsonx.iam_url)?,
        };

        let listings = ListingsSettings {
            api_key: non_empty(self.rentcast_api_key.clone()),
            endpoint: parse_url("RENTCAST_URL", &self.rentcast_url)?,
        };

        let store = StoreConfig {
            backend: self.store.vector_backend.parse::<VectorBackend>()?,
            persist_directory: self.store.persist_directory.clone(),
            qdrant_url: parse_url("QDRANT_URL", &self.store.qdrant_url)?,
            collection: self.store.qdrant_collection.clone(),
        };

        let embedding = EmbeddingSettings {
            provider: self.store.embeddings_provider.parse::<EmbeddingProvider>()?,
            model: self.store.embeddings_model.clone(),
            dimensions: self.store.embeddings_dimensions,
        };

        let (ingest, agent, bind_addr) = match &self.command {
            Command::Ingest {
                data_dir,
                ledger,
                chunk_size,
                chunk_overlap,
            } => (
                IngestSettings {
                    data_dir: data_dir.clone(),
                    ledger_path: ledger.clone(),
                    chunking: ChunkingOptions {
                        chunk_size: *chunk_size,
                        chunk_overlap: *chunk_overlap,
                        ..ChunkingOptions::default()
                    },
                },
                AgentSettings::default(),
                String::new(),
            ),
            Command::Serve { bind, agent } => (default_ingest(), (*agent).into(), bind.clone()),
            Command::Ask { agent, .. } => (default_ingest(), (*agent).into(), String::new()),
        };

        Ok(AppConfig {
            watsonx,
            listings,
            store,
            embedding,
            ingest,
            agent,
            bind_addr,
        })
    }
}

fn default_ingest() -> IngestSettings {
    IngestSettings {
        data_dir: PathBuf::from("data"),
        ledger_path: PathBuf::from(".ingested_files"),
        chunking: ChunkingOptions::default(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.app_config()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "rag-chat boot"
    );

    match cli.command {
        Command::Ingest { .. } => {
            let pipeline = IngestionPipeline::new(&config.ingest);
            let outcome = pipeline.run(|| open_ingest_backends(&config)).await?;

            match outcome {
                IngestionOutcome::MissingDirectory(path) => {
                    println!("Error: Directory '{}' not found.", path.display());
                }
                IngestionOutcome::NothingToDo => {
                    println!("No new PDF files to ingest.");
                }
                IngestionOutcome::Completed(report) => {
                    for skipped in &report.skipped {
                        warn!(file = %skipped.file_name, reason = %skipped.reason, "skipped pdf");
                    }
                    println!(
                        "Ingested {} file(s), {} chunk(s); skipped {}.",
                        report.ingested.len(),
                        report.chunks_added,
                        report.skipped.len()
                    );
                    println!(
                        "Vector store now contains {} documents.",
                        report.total_documents
                    );
                }
            }
        }
        Command::Serve { .. } => {
            let runtime = ChatRuntime::from_config(&config).await?;
            let state = AppState::new(runtime.generator, runtime.agent);
            serve(&config.bind_addr, state).await?;
        }
        Command::Ask { query, .. } => {
            let runtime = ChatRuntime::from_config(&config).await?;
            let answer = runtime
                .agent
                .run(&query)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("{answer}");
        }
    }

    Ok(())
}
