//! Minimal authorization server client for authpause
//!
//! This crate talks to the handful of endpoints the authorization-interrupt
//! protocol needs: the federated connection token exchange, CIBA
//! (`/bc-authorize` plus token polling), the OAuth 2.0 device authorization
//! grant, and an OpenFGA relationship check.
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires AUTH0_DOMAIN, AUTH0_CLIENT_ID and AUTH0_CLIENT_SECRET
//! use authpause_auth0::{Auth0Client, TokenExchangeParams};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Auth0Client::from_env()?;
//!
//! let token = client
//!     .token_exchange(&TokenExchangeParams {
//!         refresh_token: "user-refresh-token".to_string(),
//!         connection: "google-oauth2".to_string(),
//!         login_hint: None,
//!     })
//!     .await?;
//! println!("granted scopes: {:?}", token.scopes());
//! # Ok(())
//! # }
//! ```
//!
//! # Polling Grants
//!
//! CIBA and device code polling report progress through OAuth error codes.
//! They come back as [`Auth0Error::OAuth`] so callers can tell
//! `authorization_pending` and `slow_down` apart from a denial:
//!
//! ```no_run
//! use authpause_auth0::{Auth0Client, OAuthErrorCode};
//!
//! # async fn example(client: Auth0Client) -> Result<(), Box<dyn std::error::Error>> {
//! match client.poll_ciba("auth-req-id").await {
//!     Ok(token) => println!("approved: {}", token.access_token),
//!     Err(e) => match e.oauth().map(|o| &o.code) {
//!         Some(OAuthErrorCode::AuthorizationPending) => println!("still waiting"),
//!         Some(OAuthErrorCode::AccessDenied) => println!("denied"),
//!         _ => return Err(e.into()),
//!     },
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Retry Configuration
//!
//! Transient failures (408, 429, 5xx, network) are retried with exponential
//! backoff. OAuth protocol errors never are.
//!
//! ```
//! use authpause_auth0::{Auth0Client, RetryConfig};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Auth0Client::builder()
//!     .domain("tenant.us.auth0.com")
//!     .client_id("client-id")
//!     .client_secret("client-secret")
//!     .retry_config(RetryConfig {
//!         max_retries: 3,
//!         base_delay: Duration::from_millis(250),
//!         max_delay: Duration::from_secs(5),
//!         jitter: 0.25,
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod fga;
pub mod grants;

pub use client::{Auth0Client, Auth0ClientBuilder};

pub use error::{Auth0Error, OAuthError, OAuthErrorCode, OAuthErrorResponse, RetryConfig};

pub use fga::{FgaClient, FgaClientBuilder, FgaError, TupleKey};

pub use grants::{
    BackchannelAuthorizeParams, BackchannelAuthorizeResponse, DeviceAuthorizationParams,
    DeviceCodeResponse, TokenExchangeParams, TokenResponse, DEFAULT_POLL_INTERVAL_SECS,
    MIN_POLL_INTERVAL_SECS,
};
