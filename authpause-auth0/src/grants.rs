//! Request and response types for the grants used by authpause.

use serde::{Deserialize, Serialize};

/// Grant type for exchanging a refresh token for a federated connection token
pub const GRANT_TYPE_FEDERATED_CONNECTION: &str =
    "urn:auth0:params:oauth:grant-type:token-exchange:federated-connection-access-token";

/// Grant type for polling a CIBA request
pub const GRANT_TYPE_CIBA: &str = "urn:openid:params:grant-type:ciba";

/// Grant type for polling a device authorization
pub const GRANT_TYPE_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Subject token type for a refresh token
pub const SUBJECT_TOKEN_TYPE_REFRESH_TOKEN: &str = "urn:ietf:params:oauth:token-type:refresh_token";

/// Requested token type for a federated connection access token
pub const REQUESTED_TOKEN_TYPE_FEDERATED_CONNECTION: &str =
    "http://auth0.com/oauth/token-type/federated-connection-access-token";

/// Default polling interval when the server does not send one (RFC 8628 §3.2)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Lower bound applied to server-sent polling intervals
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

// ============================================================================
// Token endpoint
// ============================================================================

/// Successful response from the token endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Space-delimited list of granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Granted scopes, split on whitespace
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Parameters for the federated connection token exchange
#[derive(Debug, Clone)]
pub struct TokenExchangeParams {
    /// Refresh token of the signed-in user
    pub refresh_token: String,
    /// Connection name (e.g. `google-oauth2`)
    pub connection: String,
    /// Optional upstream login hint
    pub login_hint: Option<String>,
}

// ============================================================================
// CIBA
// ============================================================================

/// Parameters for a backchannel authorization request
#[derive(Debug, Clone, Default)]
pub struct BackchannelAuthorizeParams {
    /// Scopes to request; `openid` is added if missing
    pub scopes: Vec<String>,
    /// Message shown to the user on their authentication device
    pub binding_message: String,
    /// User identifier the request is addressed to (`sub` claim)
    pub user_id: String,
    /// Optional API audience
    pub audience: Option<String>,
    /// Optional `acr_values`
    pub acr_values: Option<String>,
    /// Requested lifetime of the request in seconds
    pub requested_expiry: Option<u64>,
}

/// Response from `/bc-authorize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackchannelAuthorizeResponse {
    pub auth_req_id: String,
    /// Lifetime of the request in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Minimum polling interval in seconds
    #[serde(default)]
    pub interval: Option<u64>,
}

impl BackchannelAuthorizeResponse {
    /// Polling interval, falling back to the default; never below one second
    pub fn interval_secs(&self) -> u64 {
        self.interval
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .max(MIN_POLL_INTERVAL_SECS)
    }
}

// ============================================================================
// Device authorization
// ============================================================================

/// Parameters for a device authorization request
#[derive(Debug, Clone, Default)]
pub struct DeviceAuthorizationParams {
    pub scopes: Vec<String>,
    pub audience: Option<String>,
}

/// Response from the device authorization endpoint (RFC 8628 §3.2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    /// Lifetime of the device code in seconds
    pub expires_in: u64,
    /// Minimum polling interval in seconds
    #[serde(default)]
    pub interval: Option<u64>,
}

impl DeviceCodeResponse {
    /// Polling interval, falling back to the default; never below one second
    pub fn interval_secs(&self) -> u64 {
        self.interval
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
            .max(MIN_POLL_INTERVAL_SECS)
    }
}

/// Build the `scope` parameter, making sure `openid` is present
pub(crate) fn scope_with_openid(scopes: &[String]) -> String {
    let mut all: Vec<&str> = Vec::with_capacity(scopes.len() + 1);
    if !scopes.iter().any(|s| s == "openid") {
        all.push("openid");
    }
    all.extend(scopes.iter().map(String::as_str));
    all.join(" ")
}

/// Build the CIBA `login_hint` for a user id
pub(crate) fn login_hint_for(user_id: &str, issuer: &str) -> String {
    serde_json::json!({
        "format": "iss_sub",
        "iss": issuer,
        "sub": user_id,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_scopes() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "at",
            "scope": "openid  calendar.freebusy email"
        }))
        .unwrap();
        assert_eq!(
            response.scopes(),
            vec!["openid", "calendar.freebusy", "email"]
        );

        let response: TokenResponse =
            serde_json::from_value(serde_json::json!({"access_token": "at"})).unwrap();
        assert!(response.scopes().is_empty());
    }

    #[test]
    fn test_scope_with_openid() {
        assert_eq!(scope_with_openid(&[]), "openid");
        assert_eq!(
            scope_with_openid(&["stock:trade".to_string()]),
            "openid stock:trade"
        );
        assert_eq!(
            scope_with_openid(&["email".to_string(), "openid".to_string()]),
            "email openid"
        );
    }

    #[test]
    fn test_login_hint_format() {
        let hint: serde_json::Value =
            serde_json::from_str(&login_hint_for("auth0|123", "https://tenant.example/")).unwrap();
        assert_eq!(hint["format"], "iss_sub");
        assert_eq!(hint["iss"], "https://tenant.example/");
        assert_eq!(hint["sub"], "auth0|123");
    }

    #[test]
    fn test_device_code_default_interval() {
        let response: DeviceCodeResponse = serde_json::from_value(serde_json::json!({
            "device_code": "dc",
            "user_code": "WDJB-MJHT",
            "verification_uri": "https://example.com/activate",
            "expires_in": 900
        }))
        .unwrap();
        assert_eq!(response.interval_secs(), 5);
        assert!(response.verification_uri_complete.is_none());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let ciba: BackchannelAuthorizeResponse = serde_json::from_value(serde_json::json!({
            "auth_req_id": "abc123",
            "expires_in": 300,
            "interval": 0
        }))
        .unwrap();
        assert_eq!(ciba.interval_secs(), MIN_POLL_INTERVAL_SECS);

        let device: DeviceCodeResponse = serde_json::from_value(serde_json::json!({
            "device_code": "dc",
            "user_code": "WDJB-MJHT",
            "verification_uri": "https://example.com/activate",
            "expires_in": 900,
            "interval": 0
        }))
        .unwrap();
        assert_eq!(device.interval_secs(), MIN_POLL_INTERVAL_SECS);
    }
}
