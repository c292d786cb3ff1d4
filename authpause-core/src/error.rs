//! Top-level error type for authpause
//!
//! Flattens the per-layer errors into categories by how callers handle them:
//!
//! - [`Error::Interrupted`] - Hand the interrupt to the client and wait
//! - [`Error::Auth`] - The authorization server rejected the request
//! - [`Error::RateLimited`] - Back off and retry
//! - [`Error::Network`] - Check connectivity, retry
//! - [`Error::Unavailable`] - Service is down, wait and retry
//! - [`Error::Tool`] - Tool execution failed
//! - [`Error::Store`] - Pending state or thread storage failed
//! - [`Error::Config`] - Fix configuration (missing domain, client id)

use thiserror::Error;

use authpause_auth0::{Auth0Error, FgaError};

use crate::authorizer::AuthorizeError;
use crate::interrupt::Interrupt;
use crate::resumer::ThreadStoreError;
use crate::store::AuthStoreError;
use crate::tool::ToolError;

#[derive(Debug, Error)]
pub enum Error {
    /// The call is waiting on the user
    #[error("{0}")]
    Interrupted(Box<Interrupt>),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Self::Tool(_))
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this error is potentially retryable
    ///
    /// Interrupts are not: they resolve through the user, not a retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Network(_) | Self::Unavailable(_)
        )
    }

    /// The interrupt carried by this error, if any
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            Self::Interrupted(interrupt) => Some(interrupt),
            _ => None,
        }
    }
}

impl From<Auth0Error> for Error {
    fn from(err: Auth0Error) -> Self {
        match err {
            Auth0Error::OAuth(e) => Self::Auth(e.to_string()),
            Auth0Error::RateLimited(msg) => Self::RateLimited(msg),
            Auth0Error::ServiceUnavailable(msg) => Self::Unavailable(msg),
            Auth0Error::Network(msg) => Self::Network(msg),
            Auth0Error::InvalidResponse(msg) => Self::Other(format!("invalid response: {}", msg)),
            Auth0Error::Json(e) => Self::Other(e.to_string()),
            Auth0Error::Configuration(msg) => Self::Config(msg),
            Auth0Error::Other(msg) => Self::Other(msg),
        }
    }
}

impl From<FgaError> for Error {
    fn from(err: FgaError) -> Self {
        match err {
            FgaError::Network(msg) => Self::Network(msg),
            FgaError::Configuration(msg) => Self::Config(msg),
            other => Self::Auth(other.to_string()),
        }
    }
}

impl From<AuthStoreError> for Error {
    fn from(err: AuthStoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<ThreadStoreError> for Error {
    fn from(err: ThreadStoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<AuthorizeError> for Error {
    fn from(err: AuthorizeError) -> Self {
        match err {
            AuthorizeError::Interrupted { message, .. } => Self::Auth(message),
            AuthorizeError::Transport(e) => e.into(),
            AuthorizeError::Fga(e) => e.into(),
            AuthorizeError::Store(e) => e.into(),
        }
    }
}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Interrupted(interrupt) => Self::Interrupted(interrupt),
            ToolError::Authorization(source) => (*source).into(),
            ToolError::NestedAuthorization { .. } => Self::Config(err.to_string()),
            other => Self::Tool(other.to_string()),
        }
    }
}

impl From<Interrupt> for Error {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupted(Box::new(interrupt))
    }
}

/// Result type for authpause operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptKind;

    #[test]
    fn test_is_retryable() {
        assert!(Error::RateLimited("slow down".into()).is_retryable());
        assert!(Error::Network("connection refused".into()).is_retryable());
        assert!(Error::Unavailable("503".into()).is_retryable());

        assert!(!Error::Auth("invalid_client".into()).is_retryable());
        assert!(!Error::Config("missing domain".into()).is_retryable());
    }

    #[test]
    fn test_interrupt_survives_conversion() {
        let tool_err = ToolError::from(Interrupt::new(
            "call_1",
            InterruptKind::AccessDenied {
                reason: "no".into(),
            },
        ));
        let err: Error = tool_err.into();
        assert!(err.is_interrupt());
        assert!(!err.is_retryable());
        assert_eq!(err.interrupt().unwrap().tool_call_id(), "call_1");
    }

    #[test]
    fn test_from_auth0_error() {
        let err: Error = Auth0Error::RateLimited("429".into()).into();
        assert!(err.is_rate_limited());

        let err: Error = Auth0Error::Network("reset".into()).into();
        assert!(err.is_network());

        let err: Error = AuthorizeError::Transport(Auth0Error::Configuration("domain".into())).into();
        assert!(err.is_config());
    }

    #[test]
    fn test_from_store_errors() {
        let err: Error = AuthStoreError::Read("gone".into()).into();
        assert!(err.is_store());

        let err: Error = ThreadStoreError::NotFound("t1".into()).into();
        assert!(err.is_store());
    }

    #[test]
    fn test_authorization_failure_keeps_classification() {
        let tool_err = AuthorizeError::Transport(Auth0Error::Network("reset".into()))
            .into_tool_error("call_1");
        let err: Error = tool_err.into();
        assert!(err.is_network());
        assert!(err.is_retryable());

        let tool_err = AuthorizeError::Transport(Auth0Error::RateLimited("429".into()))
            .into_tool_error("call_1");
        assert!(Error::from(tool_err).is_rate_limited());
    }

    #[test]
    fn test_nesting_is_a_configuration_error() {
        let err: Error = ToolError::NestedAuthorization {
            active: "call_1".into(),
            requested: "inner".into(),
        }
        .into();
        assert!(err.is_config());
    }
}
