//! Authorization server client

use crate::error::{Auth0Error, RetryConfig};
use crate::grants::{
    login_hint_for, scope_with_openid, BackchannelAuthorizeParams, BackchannelAuthorizeResponse,
    DeviceAuthorizationParams, DeviceCodeResponse, TokenExchangeParams, TokenResponse,
    GRANT_TYPE_CIBA, GRANT_TYPE_DEVICE_CODE, GRANT_TYPE_FEDERATED_CONNECTION,
    REQUESTED_TOKEN_TYPE_FEDERATED_CONNECTION, SUBJECT_TOKEN_TYPE_REFRESH_TOKEN,
};
use std::time::Duration;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_PATH: &str = "/oauth/token";
const BC_AUTHORIZE_PATH: &str = "/bc-authorize";
const DEVICE_CODE_PATH: &str = "/oauth/device/code";

type Form = Vec<(&'static str, String)>;

// ============================================================================
// Client
// ============================================================================

/// Client for the authorization server endpoints used by authpause
///
/// Covers the federated connection token exchange, CIBA (`/bc-authorize` plus
/// token polling) and the OAuth 2.0 device authorization grant.
#[derive(Clone)]
pub struct Auth0Client {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: Option<String>,
    retry_config: RetryConfig,
}

impl std::fmt::Debug for Auth0Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth0Client")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("retry_config", &self.retry_config)
            .finish()
    }
}

impl Auth0Client {
    /// Create a client for a tenant domain with client credentials
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, Auth0Error> {
        Self::builder()
            .domain(domain)
            .client_id(client_id)
            .client_secret(client_secret)
            .build()
    }

    /// Create a client from `AUTH0_DOMAIN`, `AUTH0_CLIENT_ID` and
    /// `AUTH0_CLIENT_SECRET` (the secret is optional for public clients)
    pub fn from_env() -> Result<Self, Auth0Error> {
        let domain = std::env::var("AUTH0_DOMAIN").map_err(|_| {
            Auth0Error::Configuration("AUTH0_DOMAIN environment variable not set".to_string())
        })?;
        let client_id = std::env::var("AUTH0_CLIENT_ID").map_err(|_| {
            Auth0Error::Configuration("AUTH0_CLIENT_ID environment variable not set".to_string())
        })?;

        let mut builder = Self::builder().domain(domain).client_id(client_id);
        if let Ok(secret) = std::env::var("AUTH0_CLIENT_SECRET") {
            builder = builder.client_secret(secret);
        }
        builder.build()
    }

    /// Create a builder for more advanced configuration
    pub fn builder() -> Auth0ClientBuilder {
        Auth0ClientBuilder::new()
    }

    /// Base URL all endpoints are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issuer identifier (base URL with trailing slash)
    pub fn issuer(&self) -> String {
        format!("{}/", self.base_url)
    }

    /// Client id this client authenticates as
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Exchange a refresh token for a federated connection access token
    ///
    /// A non-success response means "no credential available"; callers turn
    /// it into an interrupt rather than a hard failure.
    pub async fn token_exchange(
        &self,
        params: &TokenExchangeParams,
    ) -> Result<TokenResponse, Auth0Error> {
        let mut form = self.client_auth_form();
        form.push(("grant_type", GRANT_TYPE_FEDERATED_CONNECTION.to_string()));
        form.push((
            "subject_token_type",
            SUBJECT_TOKEN_TYPE_REFRESH_TOKEN.to_string(),
        ));
        form.push(("subject_token", params.refresh_token.clone()));
        form.push(("connection", params.connection.clone()));
        form.push((
            "requested_token_type",
            REQUESTED_TOKEN_TYPE_FEDERATED_CONNECTION.to_string(),
        ));
        if let Some(hint) = &params.login_hint {
            form.push(("login_hint", hint.clone()));
        }

        log::debug!(
            "exchanging refresh token for connection '{}'",
            params.connection
        );
        self.post_form(TOKEN_PATH, form, false).await
    }

    /// Start a CIBA request with `/bc-authorize`
    pub async fn backchannel_authorize(
        &self,
        params: &BackchannelAuthorizeParams,
    ) -> Result<BackchannelAuthorizeResponse, Auth0Error> {
        let mut form: Form = Vec::new();
        if self.client_secret.is_none() {
            form.push(("client_id", self.client_id.clone()));
        }
        form.push(("scope", scope_with_openid(&params.scopes)));
        form.push(("binding_message", params.binding_message.clone()));
        form.push((
            "login_hint",
            login_hint_for(&params.user_id, &self.issuer()),
        ));
        if let Some(audience) = &params.audience {
            form.push(("audience", audience.clone()));
        }
        if let Some(acr) = &params.acr_values {
            form.push(("acr_values", acr.clone()));
        }
        if let Some(expiry) = params.requested_expiry {
            form.push(("requested_expiry", expiry.to_string()));
        }

        log::debug!("starting backchannel authorization for '{}'", params.user_id);
        self.post_form(BC_AUTHORIZE_PATH, form, true).await
    }

    /// Poll the token endpoint for a CIBA request
    ///
    /// Returns `Auth0Error::OAuth` with `authorization_pending` or
    /// `slow_down` while the user has not responded.
    pub async fn poll_ciba(&self, auth_req_id: &str) -> Result<TokenResponse, Auth0Error> {
        let mut form = self.client_auth_form();
        form.push(("grant_type", GRANT_TYPE_CIBA.to_string()));
        form.push(("auth_req_id", auth_req_id.to_string()));
        self.post_form(TOKEN_PATH, form, false).await
    }

    /// Start a device authorization request
    pub async fn device_authorization(
        &self,
        params: &DeviceAuthorizationParams,
    ) -> Result<DeviceCodeResponse, Auth0Error> {
        let mut form: Form = vec![("client_id", self.client_id.clone())];
        form.push(("scope", scope_with_openid(&params.scopes)));
        if let Some(audience) = &params.audience {
            form.push(("audience", audience.clone()));
        }
        self.post_form(DEVICE_CODE_PATH, form, false).await
    }

    /// Poll the token endpoint for a device code
    pub async fn poll_device(&self, device_code: &str) -> Result<TokenResponse, Auth0Error> {
        let mut form = self.client_auth_form();
        form.push(("grant_type", GRANT_TYPE_DEVICE_CODE.to_string()));
        form.push(("device_code", device_code.to_string()));
        self.post_form(TOKEN_PATH, form, false).await
    }

    /// `client_id` plus `client_secret` when configured (client_secret_post)
    fn client_auth_form(&self) -> Form {
        let mut form: Form = vec![("client_id", self.client_id.clone())];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }
        form
    }

    /// POST a form with automatic retry on transient failures
    ///
    /// Only 408/429/5xx and network errors are retried. OAuth error bodies are
    /// returned to the caller as-is, including a polling `slow_down` sent
    /// with 429.
    async fn post_form<T>(&self, path: &str, form: Form, basic_auth: bool) -> Result<T, Auth0Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<Auth0Error> = None;

        for attempt in 0..=self.retry_config.max_retries {
            let mut request = self.client.post(&url).form(&form);
            if basic_auth {
                if let Some(secret) = &self.client_secret {
                    request = request.basic_auth(&self.client_id, Some(secret));
                }
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            Auth0Error::InvalidResponse(format!("Failed to parse response: {}", e))
                        });
                    }

                    let retry_after = RetryConfig::parse_retry_after(response.headers());
                    let status_code = status.as_u16();
                    let body = response.text().await.unwrap_or_default();
                    let error = Auth0Error::from_response_body(&body, status_code);

                    if attempt < self.retry_config.max_retries
                        && Auth0Error::is_retryable_status(status_code)
                        && error.is_retryable()
                    {
                        let delay =
                            retry_after.unwrap_or_else(|| self.retry_config.delay_for_attempt(attempt));
                        log::warn!(
                            "POST {} returned {}, retrying in {:?}",
                            path,
                            status_code,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        last_error = Some(error);
                        continue;
                    }

                    return Err(error);
                }
                Err(e) => {
                    let error = Auth0Error::from_reqwest_error(e);

                    if attempt < self.retry_config.max_retries && error.is_retryable() {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        log::warn!("POST {} failed ({}), retrying in {:?}", path, error, delay);
                        tokio::time::sleep(delay).await;
                        last_error = Some(error);
                        continue;
                    }

                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Auth0Error::Other("Max retries exceeded".to_string())))
    }
}

/// Builder for [`Auth0Client`]
///
/// `domain` (or `base_url`) and `client_id` are required.
pub struct Auth0ClientBuilder {
    base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    timeout: Option<Duration>,
    retry_config: Option<RetryConfig>,
}

impl Auth0ClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            client_id: None,
            client_secret: None,
            timeout: None,
            retry_config: None,
        }
    }

    /// Set the tenant domain (`tenant.us.auth0.com`); `https://` is assumed
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let base = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain
        } else {
            format!("https://{}", domain)
        };
        self.base_url = Some(base);
        self
    }

    /// Set the full base URL (useful for tests and proxies)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the client id
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the client secret
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum number of retries (default: 2)
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        let mut config = self.retry_config.take().unwrap_or_default();
        config.max_retries = max_retries;
        self.retry_config = Some(config);
        self
    }

    /// Set custom retry configuration
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<Auth0Client, Auth0Error> {
        let base_url = self
            .base_url
            .ok_or_else(|| Auth0Error::Configuration("domain is required".to_string()))?;
        let client_id = self
            .client_id
            .ok_or_else(|| Auth0Error::Configuration("client_id is required".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| {
                Auth0Error::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Auth0Client {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret: self.client_secret,
            retry_config: self.retry_config.unwrap_or_default(),
        })
    }
}
