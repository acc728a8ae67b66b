use crate::config::{EmbeddingProvider, EmbeddingSettings};
use crate::error::{ConfigError, IngestError};
use crate::watsonx::WatsonxAuth;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "local-embeddings")]
use std::sync::Mutex;
use tracing::debug;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const MINILM_DIMENSIONS: usize = 384;
pub const EMBEDDINGS_API_VERSION: &str = "2023-10-25";

const BATCH_SIZE: usize = 100;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Hashed character-trigram embedder. Deterministic and offline.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    inputs: &'a [String],
    model_id: &'a str,
    project_id: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    results: Vec<EmbeddingResult>,
}

#[derive(Deserialize)]
struct EmbeddingResult {
    embedding: Vec<f32>,
}

/// Remote embeddings served by watsonx.ai.
pub struct WatsonxEmbedder {
    auth: Arc<WatsonxAuth>,
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: usize,
}

impl WatsonxEmbedder {
    pub fn new(
        auth: Arc<WatsonxAuth>,
        client: Client,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, ConfigError> {
        let mut endpoint = auth
            .settings()
            .base_url
            .join("/ml/v1/text/embeddings")
            .map_err(|source| ConfigError::Url {
                name: "WATSONX_URL",
                source,
            })?;
        endpoint.set_query(Some(&format!("version={EMBEDDINGS_API_VERSION}")));

        Ok(Self {
            auth,
            client,
            endpoint,
            model: model.into(),
            dimensions,
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        if let Some(message) = self.auth.misconfiguration() {
            return Err(IngestError::Embedding(message));
        }

        let token = self
            .auth
            .bearer_token()
            .await
            .map_err(|error| IngestError::Embedding(error.to_string()))?;
        let project_id = self.auth.settings().project_id.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Accept", "application/json")
            .bearer_auth(token)
            .json(&EmbeddingRequest {
                inputs,
                model_id: &self.model,
                project_id,
            })
            .send()
            .await
            .map_err(|error| IngestError::Embedding(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Embedding(format!(
                "embedding request returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| IngestError::Embedding(error.to_string()))?;

        if parsed.results.len() != inputs.len() {
            return Err(IngestError::Embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.results.len()
            )));
        }

        Ok(parsed.results.into_iter().map(|result| result.embedding).collect())
    }
}

#[async_trait]
impl Embedder for WatsonxEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IngestError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            debug!(inputs = batch.len(), model = %self.model, "requesting embeddings");
            vectors.extend(self.request(batch).await?);
        }
        Ok(vectors)
    }
}

/// Accepts `all-minilm-l6-v2` as well as hub ids like
/// `sentence-transformers/all-MiniLM-L6-v2`.
fn local_model_key(name: &str) -> String {
    let lowered = name.trim().to_ascii_lowercase();
    match lowered.rsplit_once('/') {
        Some((_, model)) => model.to_string(),
        None => lowered,
    }
}

pub fn local_model_dimensions(name: &str) -> Option<usize> {
    match local_model_key(name).as_str() {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" | "multilingual-e5-small" => {
            Some(MINILM_DIMENSIONS)
        }
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => Some(768),
        "bge-large-en-v1.5" | "multilingual-e5-large" => Some(1024),
        _ => None,
    }
}

#[cfg(feature = "local-embeddings")]
fn fastembed_model(name: &str) -> Option<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel;

    match local_model_key(name).as_str() {
        "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Some(EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Some(EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Some(EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Some(EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Some(EmbeddingModel::MultilingualE5Large),
        _ => None,
    }
}

/// Sentence-transformer embeddings computed in-process with fastembed.
///
/// The model is fetched and loaded on the first call, then reused. Inference
/// runs on the blocking pool.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dimensions: usize,
    engine: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(model_name: &str) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownVariant {
            kind: "local embedding model",
            value: model_name.to_string(),
        };
        let model = fastembed_model(model_name).ok_or_else(unknown)?;
        let dimensions = local_model_dimensions(model_name).ok_or_else(unknown)?;

        Ok(Self {
            model_name: model_name.to_string(),
            model,
            dimensions,
            engine: Arc::new(Mutex::new(None)),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed_blocking(
        engine: &Mutex<Option<fastembed::TextEmbedding>>,
        model: fastembed::EmbeddingModel,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, IngestError> {
        let mut guard = engine
            .lock()
            .map_err(|_| IngestError::Embedding("local embedding model lock poisoned".to_string()))?;

        if guard.is_none() {
            let loaded = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(model))
                .map_err(|error| {
                    IngestError::Embedding(format!("failed to load local embedding model: {error}"))
                })?;
            *guard = Some(loaded);
        }

        let engine = guard
            .as_mut()
            .ok_or_else(|| IngestError::Embedding("local embedding model unavailable".to_string()))?;

        engine
            .embed(texts, Some(BATCH_SIZE))
            .map_err(|error| IngestError::Embedding(format!("local embedding failed: {error}")))
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, IngestError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IngestError::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(inputs = texts.len(), model = %self.model_name, "embedding locally");
        let engine = Arc::clone(&self.engine);
        let model = self.model.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || Self::embed_blocking(&engine, model, texts))
            .await
            .map_err(|error| IngestError::Embedding(format!("local embedding task failed: {error}")))?
    }
}

#[cfg(feature = "local-embeddings")]
fn local_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, ConfigError> {
    Ok(Arc::new(LocalEmbedder::new(&settings.model)?))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_embedder(_settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, ConfigError> {
    Err(ConfigError::Unsupported(
        "the local embedding provider requires the `local-embeddings` feature; \
         use EMBEDDINGS_PROVIDER=watsonx or ngram"
            .to_string(),
    ))
}

pub fn build_embedder(
    settings: &EmbeddingSettings,
    auth: Arc<WatsonxAuth>,
    client: Client,
) -> Result<Arc<dyn Embedder>, ConfigError> {
    match settings.provider {
        EmbeddingProvider::Local => local_embedder(settings),
        EmbeddingProvider::Watsonx => Ok(Arc::new(WatsonxEmbedder::new(
            auth,
            client,
            settings.model.clone(),
            settings.dimensions.unwrap_or(MINILM_DIMENSIONS),
        )?)),
        EmbeddingProvider::Ngram => Ok(Arc::new(CharacterNgramEmbedder {
            dimensions: settings.dimensions.unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        build_embedder, local_model_dimensions, CharacterNgramEmbedder, Embedder, WatsonxEmbedder,
    };
    use crate::config::{
        EmbeddingProvider, EmbeddingSettings, WatsonxSettings, DEFAULT_EMBEDDINGS_MODEL,
    };
    use crate::test_support::spawn_stub;
    use crate::watsonx::WatsonxAuth;
    use axum::{routing::post, Json, Router};
    use reqwest::Client;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use url::Url;

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Security deposit returns").await.expect("embed");
        let second = embedder.embed("Security deposit returns").await.expect("embed");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await.expect("embed");
        assert_eq!(vector.len(), 32);
        assert_eq!(embedder.dimensions(), 32);
    }

    #[tokio::test]
    async fn watsonx_embedder_batches_inputs() {
        let app = Router::new().route(
            "/ml/v1/text/embeddings",
            post(|Json(body): Json<Value>| async move {
                let count = body["inputs"].as_array().map(Vec::len).unwrap_or(0);
                let results: Vec<Value> = (0..count)
                    .map(|index| json!({ "embedding": [index as f32, 1.0, 0.0] }))
                    .collect();
                Json(json!({ "results": results, "model_id": body["model_id"] }))
            }),
        );
        let base = Url::parse(&spawn_stub(app).await).expect("url");
        let mut settings = WatsonxSettings::new(base.clone(), base);
        settings.access_token = Some("token".to_string());
        settings.project_id = Some("project".to_string());
        let client = Client::new();
        let auth = Arc::new(WatsonxAuth::new(settings, client.clone()));
        let embedder =
            WatsonxEmbedder::new(auth, client, DEFAULT_EMBEDDINGS_MODEL, 3).expect("embedder");

        let texts = vec!["one".to_string(), "two".to_string()];
        let vectors = embedder.embed_batch(&texts).await.expect("embeddings");

        assert_eq!(vectors, vec![vec![0.0, 1.0, 0.0], vec![1.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn watsonx_embedder_requires_credentials() {
        let base = Url::parse("http://127.0.0.1:9").expect("url");
        let settings = WatsonxSettings::new(base.clone(), base);
        let client = Client::new();
        let auth = Arc::new(WatsonxAuth::new(settings, client.clone()));
        let embedder =
            WatsonxEmbedder::new(auth, client, DEFAULT_EMBEDDINGS_MODEL, 3).expect("embedder");

        let error = embedder.embed("text").await.unwrap_err();
        assert!(error.to_string().contains("PROJECT_ID"));
    }

    #[test]
    fn local_model_names_resolve_to_dimensions() {
        assert_eq!(local_model_dimensions(DEFAULT_EMBEDDINGS_MODEL), Some(384));
        assert_eq!(local_model_dimensions("sentence-transformers/all-MiniLM-L6-v2"), Some(384));
        assert_eq!(local_model_dimensions("BAAI/bge-base-en-v1.5"), Some(768));
        assert_eq!(local_model_dimensions("text-embedding-3-small"), None);
    }

    #[test]
    fn ngram_provider_is_offline() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProvider::Ngram,
            model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
            dimensions: Some(64),
        };
        let base = Url::parse("http://127.0.0.1:9").expect("url");
        let client = Client::new();
        let auth = Arc::new(WatsonxAuth::new(WatsonxSettings::new(base.clone(), base), client.clone()));

        let embedder = build_embedder(&settings, auth, client).expect("embedder");
        assert_eq!(embedder.dimensions(), 64);
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn local_provider_honours_embeddings_model() {
        let base = Url::parse("http://127.0.0.1:9").expect("url");
        let client = Client::new();
        let auth = Arc::new(WatsonxAuth::new(WatsonxSettings::new(base.clone(), base), client.clone()));
        let mut settings = EmbeddingSettings {
            provider: EmbeddingProvider::Local,
            model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
            dimensions: None,
        };

        let embedder =
            build_embedder(&settings, Arc::clone(&auth), client.clone()).expect("default model");
        assert_eq!(embedder.dimensions(), 384);

        settings.model = "bge-large-en-v1.5".to_string();
        let embedder =
            build_embedder(&settings, Arc::clone(&auth), client.clone()).expect("bge model");
        assert_eq!(embedder.dimensions(), 1024);

        settings.model = "no-such-model".to_string();
        let error = build_embedder(&settings, auth, client).err().expect("unknown model");
        assert!(error.to_string().contains("no-such-model"));
    }
}
