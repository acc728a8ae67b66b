use axum::{http::StatusCode, routing::post, Json, Router};
use rag_chat_core::{
    router, AppState, ChatAgent, ListingsClient, ListingsSettings, ListingsTool, ToolRegistry,
    WatsonxClient, WatsonxSettings,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use url::Url;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    format!("http://{}", addr)
}

/// Fake watsonx generation endpoint that records every `input` it receives.
async fn spawn_watsonx(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<String>>>) {
    let inputs = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&inputs);
    let app = Router::new().route(
        "/ml/v1/text/generation",
        post(move |Json(body): Json<Value>| {
            let seen = Arc::clone(&seen);
            let reply = reply.clone();
            async move {
                let input = body["input"].as_str().unwrap_or_default().to_string();
                seen.lock().expect("lock").push(input);
                (status, Json(reply))
            }
        }),
    );
    (spawn(app).await, inputs)
}

async fn spawn_api(watsonx_base: &str, credentials: bool) -> String {
    let base = Url::parse(watsonx_base).expect("watsonx url");
    let mut settings = WatsonxSettings::new(base.clone(), base);
    if credentials {
        settings.access_token = Some("token".to_string());
        settings.project_id = Some("project".to_string());
    }

    let generator = Arc::new(WatsonxClient::new(settings).expect("client"));
    let listings = ListingsClient::new(
        ListingsSettings {
            api_key: None,
            endpoint: Url::parse("http://127.0.0.1:9/listings").expect("listings url"),
        },
        Client::new(),
    );
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(ListingsTool::new(Arc::new(listings))));
    let agent = Arc::new(ChatAgent::new(generator.clone(), tools, 3));

    spawn(router(AppState::new(generator, agent))).await
}

#[tokio::test]
async fn generate_returns_trimmed_text() {
    let (watsonx, inputs) = spawn_watsonx(
        StatusCode::OK,
        json!({ "results": [{ "generated_text": " hi " }] }),
    )
    .await;
    let api = spawn_api(&watsonx, true).await;

    let response = Client::new()
        .post(format!("{api}/generate"))
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .expect("generate response");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body, json!({ "generated_text": "hi" }));
    assert_eq!(
        inputs.lock().expect("lock").as_slice(),
        ["Input: hello\nOutput:".to_string()]
    );
}

#[tokio::test]
async fn generate_passes_upstream_errors_through() {
    let upstream = json!({
        "errors": [{ "code": "invalid_input_argument", "message": "bad model" }],
        "status_code": 400
    });
    let (watsonx, _) = spawn_watsonx(StatusCode::BAD_REQUEST, upstream.clone()).await;
    let api = spawn_api(&watsonx, true).await;

    let body: Value = Client::new()
        .post(format!("{api}/generate"))
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .expect("generate response")
        .json()
        .await
        .expect("json body");

    assert_eq!(body, upstream);
}

#[tokio::test]
async fn generate_reports_missing_credentials_in_body() {
    let (watsonx, inputs) = spawn_watsonx(StatusCode::OK, json!({})).await;
    let api = spawn_api(&watsonx, false).await;

    let response = Client::new()
        .post(format!("{api}/generate"))
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .expect("generate response");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json body");
    let error = body["error"].as_str().expect("error field");
    assert!(error.contains("PROJECT_ID"));
    assert!(inputs.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn chat_reports_missing_credentials_in_body() {
    let (watsonx, inputs) = spawn_watsonx(StatusCode::OK, json!({})).await;
    let api = spawn_api(&watsonx, false).await;

    let response = Client::new()
        .post(format!("{api}/chat"))
        .json(&json!({ "query": "Can I sublet?" }))
        .send()
        .await
        .expect("chat response");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json body");
    let error = body["error"].as_str().expect("error field");
    assert!(error.contains("ACCESS_TOKEN or IBM_API_KEY"));
    assert!(error.contains("PROJECT_ID"));
    assert!(body.get("detail").is_none());
    assert!(inputs.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn blank_requests_are_rejected() {
    let (watsonx, _) = spawn_watsonx(StatusCode::OK, json!({})).await;
    let api = spawn_api(&watsonx, true).await;
    let client = Client::new();

    let generate = client
        .post(format!("{api}/generate"))
        .json(&json!({ "prompt": "   " }))
        .send()
        .await
        .expect("generate response");
    assert_eq!(generate.status(), StatusCode::BAD_REQUEST);

    let chat = client
        .post(format!("{api}/chat"))
        .json(&json!({ "query": "" }))
        .send()
        .await
        .expect("chat response");
    assert_eq!(chat.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_returns_agent_answer() {
    let (watsonx, inputs) = spawn_watsonx(
        StatusCode::OK,
        json!({ "results": [{ "generated_text": "I know this.\nFinal Answer: Check the lease." }] }),
    )
    .await;
    let api = spawn_api(&watsonx, true).await;

    let body: Value = Client::new()
        .post(format!("{api}/chat"))
        .json(&json!({ "query": "Can I sublet?" }))
        .send()
        .await
        .expect("chat response")
        .json()
        .await
        .expect("json body");

    assert_eq!(body, json!({ "answer": "Check the lease." }));
    let inputs = inputs.lock().expect("lock");
    assert!(inputs[0].contains("listings_search"));
    assert!(inputs[0].ends_with("Question: Can I sublet?\nThought:"));
}

#[tokio::test]
async fn chat_failure_is_a_server_error() {
    let (watsonx, _) = spawn_watsonx(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "errors": [{ "code": "internal_error" }] }),
    )
    .await;
    let api = spawn_api(&watsonx, true).await;

    let response = Client::new()
        .post(format!("{api}/chat"))
        .json(&json!({ "query": "Can I sublet?" }))
        .send()
        .await
        .expect("chat response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json body");
    assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("internal_error")));
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (watsonx, _) = spawn_watsonx(StatusCode::OK, json!({})).await;
    let api = spawn_api(&watsonx, true).await;

    let response = Client::new()
        .get(format!("{api}/health"))
        .header("Origin", "http://localhost:3000")
        .send()
        .await
        .expect("health response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("*")
    );
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "ok");
}
