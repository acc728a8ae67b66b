//! `/generate`, `/chat` and `/health`, with CORS open to every origin.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::agent::ChatAgent;
use crate::error::AgentError;
use crate::traits::TextGenerator;
use crate::watsonx::{Generation, GenerationParameters};

/// Shared handler state. Cloned per request, so every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    generator: Arc<dyn TextGenerator>,
    agent: Arc<ChatAgent>,
}

impl AppState {
    pub fn new(generator: Arc<dyn TextGenerator>, agent: Arc<ChatAgent>) -> Self {
        Self { generator, agent }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub generated_text: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct DetailBody {
    detail: String,
}

/// `/chat` failure, rendered as `{"detail": "..."}`.
struct ChatError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status, Json(DetailBody { detail: self.detail })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(handle_generate))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Binds `bind_addr` and serves until the process is stopped.
pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "chat server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Wraps the raw prompt in the completion template sent to the model.
pub fn completion_input(prompt: &str) -> String {
    format!("Input: {prompt}\nOutput:")
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Response {
    if request.prompt.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "prompt must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    let input = completion_input(&request.prompt);
    match state
        .generator
        .generate(&input, &GenerationParameters::default())
        .await
    {
        Ok(Generation::Text(generated_text)) => Json(GenerateResponse { generated_text }).into_response(),
        Ok(Generation::Rejected(payload)) => Json(payload).into_response(),
        Ok(Generation::Misconfigured(message)) => Json(ErrorBody { error: message }).into_response(),
        Err(err) => {
            error!(error = %err, "generation request failed");
            Json(ErrorBody {
                error: format!("Inference request failed: {err}"),
            })
            .into_response()
        }
    }
}

/// Missing credentials are reported in the body like `/generate` does. Every
/// other agent failure is a `500`.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ChatError> {
    if request.query.trim().is_empty() {
        return Err(ChatError {
            status: StatusCode::BAD_REQUEST,
            detail: "query must not be empty".to_string(),
        });
    }

    match state.agent.run(&request.query).await {
        Ok(answer) => Ok(Json(ChatResponse { answer }).into_response()),
        Err(AgentError::Misconfigured(message)) => {
            warn!(error = %message, "chat request without inference credentials");
            Ok(Json(ErrorBody { error: message }).into_response())
        }
        Err(err) => {
            error!(error = %err, "chat request failed");
            Err(ChatError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: err.to_string(),
            })
        }
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
