//! Error types for the authorization server client

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// OAuth Error Types
// ============================================================================

/// OAuth 2.0 error response body (RFC 6749 §5.2)
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Well-known OAuth error codes returned by the token endpoints
///
/// The polling grants (CIBA and device code) reuse these codes to report
/// progress, so most of them are not failures from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthErrorCode {
    /// The user has not yet approved or denied the request
    AuthorizationPending,
    /// The client polls too fast and must increase its interval
    SlowDown,
    /// The user denied the request
    AccessDenied,
    /// The auth_req_id / device_code expired before approval
    ExpiredToken,
    /// The refresh token or grant is invalid, expired, or revoked
    InvalidGrant,
    /// Client authentication failed
    InvalidClient,
    /// Requested scope is invalid or exceeds what was granted
    InvalidScope,
    /// Any other error code
    Other(String),
}

impl OAuthErrorCode {
    /// Parse the `error` field of an OAuth error response
    pub fn parse(code: &str) -> Self {
        match code {
            "authorization_pending" => Self::AuthorizationPending,
            "slow_down" => Self::SlowDown,
            "access_denied" => Self::AccessDenied,
            "expired_token" => Self::ExpiredToken,
            "invalid_grant" => Self::InvalidGrant,
            "invalid_client" => Self::InvalidClient,
            "invalid_scope" => Self::InvalidScope,
            other => Self::Other(other.to_string()),
        }
    }

    /// The wire form of the code
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::AccessDenied => "access_denied",
            Self::ExpiredToken => "expired_token",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidClient => "invalid_client",
            Self::InvalidScope => "invalid_scope",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-level error returned by the authorization server
#[derive(Debug, Clone, Error)]
#[error("{code}: {}", description.as_deref().unwrap_or("no description"))]
pub struct OAuthError {
    /// Parsed error code
    pub code: OAuthErrorCode,
    /// Human readable description, if the server sent one
    pub description: Option<String>,
    /// HTTP status of the response
    pub status: u16,
}

impl OAuthError {
    /// True while a polling grant is still waiting for the user
    pub fn is_pending(&self) -> bool {
        matches!(
            self.code,
            OAuthErrorCode::AuthorizationPending | OAuthErrorCode::SlowDown
        )
    }
}

// ============================================================================
// Client Error Types
// ============================================================================

/// Errors that can occur when talking to the authorization server
#[derive(Debug, Error)]
pub enum Auth0Error {
    /// The server answered with an OAuth error body
    #[error("OAuth error: {0}")]
    OAuth(OAuthError),

    /// Rate limited by the server
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Server error or unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Invalid response (failed to parse the body)
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (missing domain, client id, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl Auth0Error {
    /// Returns true if this error is retryable
    ///
    /// OAuth protocol errors are never retried here. Polling grants handle
    /// `authorization_pending` and `slow_down` at a higher level.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Auth0Error::RateLimited(_) | Auth0Error::ServiceUnavailable(_) | Auth0Error::Network(_)
        )
    }

    /// Returns true if this error is retryable based on HTTP status code
    pub fn is_retryable_status(status_code: u16) -> bool {
        matches!(status_code, 408 | 429 | 500..=599)
    }

    /// The OAuth error, if the server returned one
    pub fn oauth(&self) -> Option<&OAuthError> {
        match self {
            Auth0Error::OAuth(e) => Some(e),
            _ => None,
        }
    }

    /// Classify a non-success response body
    pub fn from_response_body(body: &str, status_code: u16) -> Self {
        if let Ok(response) = serde_json::from_str::<OAuthErrorResponse>(body) {
            let code = OAuthErrorCode::parse(&response.error);
            // Polling grants may report progress with 429 (`slow_down`)
            if matches!(
                code,
                OAuthErrorCode::AuthorizationPending | OAuthErrorCode::SlowDown
            ) {
                return Auth0Error::OAuth(OAuthError {
                    code,
                    description: response.error_description,
                    status: status_code,
                });
            }
            if status_code == 429 {
                return Auth0Error::RateLimited(response.error);
            }
            if (500..=599).contains(&status_code) {
                return Auth0Error::ServiceUnavailable(response.error);
            }
            return Auth0Error::OAuth(OAuthError {
                code,
                description: response.error_description,
                status: status_code,
            });
        }

        let msg = if body.is_empty() {
            format!("HTTP {}", status_code)
        } else {
            body.to_string()
        };

        match status_code {
            429 => Auth0Error::RateLimited(msg),
            500..=599 => Auth0Error::ServiceUnavailable(msg),
            _ => Auth0Error::Other(msg),
        }
    }

    /// Classify a transport error
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Auth0Error::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            Auth0Error::Network(format!("Connection failed: {}", err))
        } else if err.is_request() {
            Auth0Error::Network(format!("Request failed: {}", err))
        } else if err.is_decode() {
            Auth0Error::InvalidResponse(err.to_string())
        } else {
            Auth0Error::Other(err.to_string())
        }
    }
}

/// Configuration for automatic retry behavior
///
/// Exponential backoff: base_delay × 2^attempt with jitter, capped at
/// `max_delay`. Respects the `Retry-After` header.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    pub max_retries: u32,

    /// Base delay for exponential backoff (default: 500ms)
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 8s)
    pub max_delay: Duration,

    /// Jitter factor (0.0-1.0) to add randomness to delays (default: 0.25)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the specified max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given retry attempt (0-indexed)
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base = self.base_delay.as_secs_f64() * 2_f64.powi(attempt as i32);

        let jitter_range = base * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let delay_secs = (base + jitter).max(0.0);

        Duration::from_secs_f64(delay_secs).min(self.max_delay)
    }

    /// Parse the retry delay from the `Retry-After` header (seconds only)
    pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}
