//! Runtime settings, filled in by the binary. The library never reads the environment.

use crate::error::ConfigError;
use crate::models::ChunkingOptions;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_MODEL_ID: &str = "ibm/granite-3-8b-instruct";
pub const DEFAULT_WATSONX_URL: &str = "https://us-south.ml.cloud.ibm.com";
pub const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com";
pub const DEFAULT_EMBEDDINGS_MODEL: &str = "sentence-transformers/all-minilm-l6-v2";
pub const DEFAULT_RENTCAST_URL: &str = "https://api.rentcast.io/v1/listings/rental/long-term";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub watsonx: WatsonxSettings,
    pub listings: ListingsSettings,
    pub store: StoreConfig,
    pub embedding: EmbeddingSettings,
    pub ingest: IngestSettings,
    pub agent: AgentSettings,
    pub bind_addr: String,
}

/// Credentials stay optional here: they are checked on every inference call.
#[derive(Debug, Clone)]
pub struct WatsonxSettings {
    pub access_token: Option<String>,
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub model_id: String,
    pub base_url: Url,
    pub iam_url: Url,
}

impl WatsonxSettings {
    pub fn new(base_url: Url, iam_url: Url) -> Self {
        Self {
            access_token: None,
            api_key: None,
            project_id: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            base_url,
            iam_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingsSettings {
    pub api_key: Option<String>,
    pub endpoint: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Local,
    Qdrant,
}

impl FromStr for VectorBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(ConfigError::UnknownVariant {
                kind: "vector backend",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: VectorBackend,
    pub persist_directory: PathBuf,
    pub qdrant_url: Url,
    pub collection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Sentence-transformer model run in-process.
    Local,
    Watsonx,
    /// Hashed character trigrams. No model download.
    Ngram,
}

impl FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "watsonx" => Ok(Self::Watsonx),
            "ngram" => Ok(Self::Ngram),
            _ => Err(ConfigError::UnknownVariant {
                kind: "embedding provider",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub data_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub chunking: ChunkingOptions,
}

#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub search_top_k: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            search_top_k: 4,
        }
    }
}

pub fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::Url { name, source })
}

/// Blank values count as unset, the same as a missing variable.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
