//! watsonx.ai text generation client.

use crate::config::WatsonxSettings;
use crate::error::{ConfigError, InferenceError};
use crate::traits::TextGenerator;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

pub const GENERATION_API_VERSION: &str = "2023-05-29";
pub const NO_TEXT_GENERATED: &str = "No text generated.";

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationParameters {
    pub decoding_method: String,
    pub max_new_tokens: u32,
    pub min_new_tokens: u32,
    pub repetition_penalty: f32,
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            decoding_method: "greedy".to_string(),
            max_new_tokens: 250,
            min_new_tokens: 0,
            repetition_penalty: 1.2,
            stop_sequences: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    /// Trimmed text of the first result.
    Text(String),
    /// Body of a non-success response, passed through untouched.
    Rejected(Value),
    /// Required credentials were not configured.
    Misconfigured(String),
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    input: &'a str,
    parameters: &'a GenerationParameters,
    model_id: &'a str,
    project_id: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expiration: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Resolves the bearer token for watsonx requests.
///
/// A configured access token is used as-is. Otherwise an IBM Cloud API key is
/// exchanged with IAM and the resulting token is cached until a minute before
/// it expires.
pub struct WatsonxAuth {
    settings: WatsonxSettings,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl WatsonxAuth {
    pub fn new(settings: WatsonxSettings, client: Client) -> Self {
        Self {
            settings,
            client,
            cached: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &WatsonxSettings {
        &self.settings
    }

    /// Names of the settings that still need a value, empty when usable.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.settings.access_token.is_none() && self.settings.api_key.is_none() {
            missing.push("ACCESS_TOKEN or IBM_API_KEY");
        }
        if self.settings.project_id.is_none() {
            missing.push("PROJECT_ID");
        }
        missing
    }

    pub fn misconfiguration(&self) -> Option<String> {
        let missing = self.missing_credentials();
        if missing.is_empty() {
            None
        } else {
            Some(format!(
                "Server configuration error: {} not found.",
                missing.join(", ")
            ))
        }
    }

    pub async fn bearer_token(&self) -> Result<String, InferenceError> {
        if let Some(token) = &self.settings.access_token {
            return Ok(token.clone());
        }

        let api_key = self.settings.api_key.as_deref().ok_or_else(|| {
            InferenceError::Authentication("no access token or api key configured".to_string())
        })?;

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.value.clone());
            }
        }

        let endpoint = iam_token_url(&self.settings.iam_url);
        debug!(endpoint = %endpoint, "exchanging api key for iam token");

        let response = self
            .client
            .post(endpoint.clone())
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "urn:ibm:params:oauth:grant-type:apikey"),
                ("apikey", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(InferenceError::Authentication(format!(
                "iam token request returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = token
            .expiration
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
            .unwrap_or_else(|| Utc::now() + Duration::minutes(55));

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}

fn iam_token_url(base: &Url) -> Url {
    let mut url = base.clone();
    url.set_path("/identity/token");
    url.set_query(None);
    url
}

pub struct WatsonxClient {
    auth: Arc<WatsonxAuth>,
    client: Client,
    endpoint: Url,
}

impl WatsonxClient {
    pub fn new(settings: WatsonxSettings) -> Result<Self, ConfigError> {
        let client = Client::new();
        let auth = Arc::new(WatsonxAuth::new(settings, client.clone()));
        Self::with_auth(auth, client)
    }

    /// Shares one token cache between generation and embedding clients.
    pub fn with_auth(auth: Arc<WatsonxAuth>, client: Client) -> Result<Self, ConfigError> {
        let mut endpoint = auth
            .settings()
            .base_url
            .join("/ml/v1/text/generation")
            .map_err(|source| ConfigError::Url {
                name: "WATSONX_URL",
                source,
            })?;
        endpoint.set_query(Some(&format!("version={GENERATION_API_VERSION}")));

        Ok(Self {
            auth,
            client,
            endpoint,
        })
    }

    pub fn auth(&self) -> Arc<WatsonxAuth> {
        Arc::clone(&self.auth)
    }

    pub fn model_id(&self) -> &str {
        &self.auth.settings().model_id
    }
}

#[async_trait]
impl TextGenerator for WatsonxClient {
    async fn generate(
        &self,
        prompt: &str,
        parameters: &GenerationParameters,
    ) -> Result<Generation, InferenceError> {
        if let Some(message) = self.auth.misconfiguration() {
            warn!(%message, "generation skipped");
            return Ok(Generation::Misconfigured(message));
        }

        let settings = self.auth.settings();
        let project_id = settings.project_id.as_deref().unwrap_or_default();
        let token = self.auth.bearer_token().await?;

        let body = GenerationRequest {
            input: prompt,
            parameters,
            model_id: &settings.model_id,
            project_id,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            warn!(status = %status, "watsonx rejected generation request");
            let payload = serde_json::from_str::<Value>(&text)
                .unwrap_or_else(|_| json!({ "error": text, "status": status.as_u16() }));
            return Ok(Generation::Rejected(payload));
        }

        let payload: Value = response.json().await?;
        let text = payload
            .pointer("/results/0/generated_text")
            .and_then(Value::as_str)
            .unwrap_or(NO_TEXT_GENERATED);

        Ok(Generation::Text(text.trim().to_string()))
    }
}
