//! RentCast listings lookup. Query segments without `=`, empty values and `None` are dropped.

use crate::config::ListingsSettings;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const RENAMES: [(&str, &str); 3] = [
    ("bedrooms", "beds"),
    ("bathrooms", "baths"),
    ("postal_code", "postalCode"),
];

pub type ListingsQuery = BTreeMap<String, String>;

pub fn parse_listing_query(input: &str) -> ListingsQuery {
    input
        .split(',')
        .filter_map(|segment| segment.split_once('='))
        .filter_map(|(key, value)| {
            let key = key.trim();
            let value = value.trim();
            // `beds=` counts as unset rather than an empty filter.
            if key.is_empty() || value.is_empty() || value == "None" {
                return None;
            }
            Some((rename_key(key).to_string(), value.to_string()))
        })
        .collect()
}

fn rename_key(key: &str) -> &str {
    RENAMES
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| *to)
        .unwrap_or(key)
}

pub struct ListingsClient {
    settings: ListingsSettings,
    client: Client,
}

impl ListingsClient {
    pub fn new(settings: ListingsSettings, client: Client) -> Self {
        Self { settings, client }
    }

    /// Returns the listings JSON, or a readable error message. Never fails.
    pub async fn search_listings(&self, query: &str) -> String {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return "Error: RENTCAST_API_KEY is not set.".to_string();
        };

        let params = parse_listing_query(query);
        debug!(?params, "querying listings");

        match self.fetch(api_key, &params).await {
            Ok(body) => body,
            Err(error) => {
                warn!(%error, "listings request failed");
                format!("Error fetching listings: {error}")
            }
        }
    }

    async fn fetch(&self, api_key: &str, params: &ListingsQuery) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .get(self.settings.endpoint.clone())
            .header("Accept", "application/json")
            .header("X-Api-Key", api_key)
            .query(params)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        Ok(match serde_json::from_str::<Value>(&body) {
            Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
            Err(_) => body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_stub;
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use url::Url;

    fn expected(pairs: &[(&str, &str)]) -> ListingsQuery {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn known_keys_are_renamed() {
        assert_eq!(
            parse_listing_query("city=Austin,bedrooms=2"),
            expected(&[("city", "Austin"), ("beds", "2")])
        );
        assert_eq!(
            parse_listing_query("bathrooms=1.5, postal_code=78701 ,state=TX"),
            expected(&[("baths", "1.5"), ("postalCode", "78701"), ("state", "TX")])
        );
    }

    #[test]
    fn malformed_and_empty_segments_are_dropped() {
        assert!(parse_listing_query("badsegment").is_empty());
        assert!(parse_listing_query("").is_empty());
        assert_eq!(
            parse_listing_query("city=Austin,oops,beds=,status=None,address=1 Main St=Apt 2"),
            expected(&[("city", "Austin"), ("address", "1 Main St=Apt 2")])
        );
    }

    fn client_for(endpoint: &str, api_key: Option<&str>) -> ListingsClient {
        ListingsClient::new(
            ListingsSettings {
                api_key: api_key.map(str::to_string),
                endpoint: Url::parse(endpoint).expect("endpoint"),
            },
            Client::new(),
        )
    }

    #[tokio::test]
    async fn missing_api_key_is_an_error_string() {
        let client = client_for("http://127.0.0.1:9/listings", None);
        let result = client.search_listings("city=Austin").await;
        assert!(result.contains("RENTCAST_API_KEY"));
    }

    #[tokio::test]
    async fn request_carries_key_header_and_renamed_params() {
        let app = Router::new().route(
            "/listings",
            get(
                |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                    Json(json!({
                        "key": headers.get("x-api-key").and_then(|v| v.to_str().ok()),
                        "params": params,
                    }))
                },
            ),
        );
        let base = spawn_stub(app).await;
        let client = client_for(&format!("{base}/listings"), Some("secret"));

        let body = client.search_listings("city=Austin,bedrooms=2").await;
        let parsed: Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(parsed["key"], "secret");
        assert_eq!(parsed["params"], json!({ "city": "Austin", "beds": "2" }));

        let body = client.search_listings("badsegment").await;
        let parsed: Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(parsed["params"], json!({}));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_a_descriptive_string() {
        let app = Router::new().route("/listings", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let base = spawn_stub(app).await;
        let client = client_for(&format!("{base}/listings"), Some("secret"));

        let result = client.search_listings("city=Austin").await;
        assert!(result.starts_with("Error fetching listings:"));
        assert!(result.contains("429"));
    }
}
