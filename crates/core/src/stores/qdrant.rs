use crate::models::{DocumentChunk, SearchHit};
use crate::traits::VectorStore;
use crate::StoreError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with cosine distance when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if response.status().is_success() {
            return Ok(());
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        info!(collection = %self.collection, size = self.vector_size, "creating qdrant collection");

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }
}

fn backend_error(status: StatusCode) -> StoreError {
    StoreError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<(), StoreError> {
        if chunks.len() != embeddings.len() {
            return Err(StoreError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                if embedding.len() != self.vector_size {
                    return Err(StoreError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": embedding,
                    "payload": {
                        "chunk_id": chunk.chunk_id,
                        "source": chunk.source,
                        "page": chunk.page,
                        "chunk_index": chunk.chunk_index,
                        "text": chunk.text,
                        "ingested_at": chunk.ingested_at.to_rfc3339(),
                    },
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        if query_vector.len() != self.vector_size {
            return Err(StoreError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .iter()
            .map(|hit| {
                let text_at = |pointer: &str| {
                    hit.pointer(pointer)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                SearchHit {
                    chunk_id: text_at("/payload/chunk_id"),
                    source: text_at("/payload/source"),
                    page: hit
                        .pointer("/payload/page")
                        .and_then(Value::as_u64)
                        .and_then(|page| u32::try_from(page).ok())
                        .unwrap_or_default(),
                    score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
                    text: text_at("/payload/text"),
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::BackendResponse {
                backend: "qdrant".to_string(),
                details: "count response without result.count".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::QdrantStore;
    use crate::test_support::spawn_stub;
    use crate::traits::VectorStore;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn missing_collection_is_created() {
        let created = Arc::new(Mutex::new(None::<Value>));
        let captured = Arc::clone(&created);
        let app = Router::new().route(
            "/collections/docs",
            get(|| async { StatusCode::NOT_FOUND }).put(move |Json(body): Json<Value>| {
                let captured = Arc::clone(&captured);
                async move {
                    *captured.lock().expect("lock") = Some(body);
                    Json(json!({ "result": true, "status": "ok" }))
                }
            }),
        );
        let base = spawn_stub(app).await;

        QdrantStore::new(base, "docs", 3)
            .ensure_collection()
            .await
            .expect("collection ensured");

        let body = created.lock().expect("lock").take().expect("create request");
        assert_eq!(body["vectors"]["size"], 3);
        assert_eq!(body["vectors"]["distance"], "Cosine");
    }

    #[tokio::test]
    async fn search_and_count_read_qdrant_payloads() {
        let app = Router::new()
            .route(
                "/collections/docs/points/search",
                post(|| async {
                    Json(json!({
                        "result": [{
                            "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26",
                            "score": 0.87,
                            "payload": {
                                "chunk_id": "abc",
                                "source": "lease.pdf",
                                "page": 3,
                                "text": "Deposits must be returned within 30 days."
                            }
                        }]
                    }))
                }),
            )
            .route(
                "/collections/docs/points/count",
                post(|| async { Json(json!({ "result": { "count": 42 } })) }),
            );
        let base = spawn_stub(app).await;
        let store = QdrantStore::new(base, "docs", 2);

        let hits = store.search(&[0.5, 0.5], 4).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "lease.pdf");
        assert_eq!(hits[0].page, 3);
        assert_eq!(store.count().await.expect("count"), 42);

        assert!(store.search(&[0.5], 4).await.is_err());
    }
}
