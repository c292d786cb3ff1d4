//! Minimal OpenFGA `check` client
//!
//! Only the relationship check is implemented; model and tuple management
//! belong to the FGA tooling.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the FGA client
#[derive(Debug, Error)]
pub enum FgaError {
    /// The FGA API rejected the request
    #[error("FGA API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response body
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A relationship tuple to check: is `user` related to `object` by `relation`?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

#[derive(Serialize)]
struct CheckRequest<'a> {
    tuple_key: &'a TupleKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct CheckResponse {
    #[serde(default)]
    allowed: bool,
}

/// OpenFGA client scoped to one store
#[derive(Clone)]
pub struct FgaClient {
    client: reqwest::Client,
    api_url: String,
    store_id: String,
    api_token: Option<String>,
    authorization_model_id: Option<String>,
}

impl std::fmt::Debug for FgaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FgaClient")
            .field("api_url", &self.api_url)
            .field("store_id", &self.store_id)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("authorization_model_id", &self.authorization_model_id)
            .finish()
    }
}

impl FgaClient {
    /// Create a client for a store
    pub fn new(api_url: impl Into<String>, store_id: impl Into<String>) -> Result<Self, FgaError> {
        Self::builder().api_url(api_url).store_id(store_id).build()
    }

    /// Create a client from `FGA_API_URL`, `FGA_STORE_ID`, and the optional
    /// `FGA_API_TOKEN` / `FGA_AUTHORIZATION_MODEL_ID`
    pub fn from_env() -> Result<Self, FgaError> {
        let api_url = std::env::var("FGA_API_URL").map_err(|_| {
            FgaError::Configuration("FGA_API_URL environment variable not set".to_string())
        })?;
        let store_id = std::env::var("FGA_STORE_ID").map_err(|_| {
            FgaError::Configuration("FGA_STORE_ID environment variable not set".to_string())
        })?;

        let mut builder = Self::builder().api_url(api_url).store_id(store_id);
        if let Ok(token) = std::env::var("FGA_API_TOKEN") {
            builder = builder.api_token(token);
        }
        if let Ok(model) = std::env::var("FGA_AUTHORIZATION_MODEL_ID") {
            builder = builder.authorization_model_id(model);
        }
        builder.build()
    }

    pub fn builder() -> FgaClientBuilder {
        FgaClientBuilder::default()
    }

    /// Check whether the tuple is allowed
    pub async fn check(&self, tuple: &TupleKey) -> Result<bool, FgaError> {
        let url = format!("{}/stores/{}/check", self.api_url, self.store_id);
        let body = CheckRequest {
            tuple_key: tuple,
            authorization_model_id: self.authorization_model_id.as_deref(),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FgaError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FgaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let check: CheckResponse = response
            .json()
            .await
            .map_err(|e| FgaError::InvalidResponse(e.to_string()))?;

        log::debug!(
            "fga check {}#{}@{} -> {}",
            tuple.object,
            tuple.relation,
            tuple.user,
            check.allowed
        );
        Ok(check.allowed)
    }
}

/// Builder for [`FgaClient`]
#[derive(Default)]
pub struct FgaClientBuilder {
    api_url: Option<String>,
    store_id: Option<String>,
    api_token: Option<String>,
    authorization_model_id: Option<String>,
    timeout: Option<Duration>,
}

impl FgaClientBuilder {
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn store_id(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn authorization_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.authorization_model_id = Some(model_id.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<FgaClient, FgaError> {
        let api_url = self
            .api_url
            .ok_or_else(|| FgaError::Configuration("api_url is required".to_string()))?;
        let store_id = self
            .store_id
            .ok_or_else(|| FgaError::Configuration("store_id is required".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| FgaError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(FgaClient {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            store_id,
            api_token: self.api_token,
            authorization_model_id: self.authorization_model_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_builder_requires_store() {
        let result = FgaClient::builder().api_url("http://localhost:8080").build();
        assert!(matches!(result, Err(FgaError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_check_allowed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/stores/store-1/check"))
            .and(header("authorization", "Bearer fga-token"))
            .and(body_json(serde_json::json!({
                "tuple_key": {
                    "user": "user:alice",
                    "relation": "can_view",
                    "object": "doc:forecast"
                },
                "authorization_model_id": "model-7"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"allowed": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = FgaClient::builder()
            .api_url(server.uri())
            .store_id("store-1")
            .api_token("fga-token")
            .authorization_model_id("model-7")
            .build()
            .unwrap();

        let allowed = client
            .check(&TupleKey::new("user:alice", "can_view", "doc:forecast"))
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_check_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/stores/store-1/check"))
            .respond_with(ResponseTemplate::new(400).set_body_string("validation_error"))
            .mount(&server)
            .await;

        let client = FgaClient::new(server.uri(), "store-1").unwrap();
        let err = client
            .check(&TupleKey::new("user:bob", "can_view", "doc:x"))
            .await
            .unwrap_err();

        assert!(matches!(err, FgaError::Api { status: 400, .. }));
    }
}
