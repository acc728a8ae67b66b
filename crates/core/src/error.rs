use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("unexpected response from {endpoint}: {details}")]
    UnexpectedResponse { endpoint: String, details: String },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("inference request failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("model rejected the request: {0}")]
    Rejected(String),

    #[error("{0}")]
    Misconfigured(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url for {name}: {source}")]
    Url {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("{0}")]
    Unsupported(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
