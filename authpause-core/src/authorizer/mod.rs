//! Authorizers turn an [`AuthorizationRequest`] into a [`Credential`] or an
//! interrupt.
//!
//! Each authorizer is one strategy:
//!
//! - [`FederatedConnectionAuthorizer`] exchanges the user's refresh token for
//!   a token to an external provider
//! - [`CibaAuthorizer`] asks the user to approve a push notification
//! - [`DeviceFlowAuthorizer`] has the user enter a code on another device
//! - [`FgaGate`] checks a relationship tuple before anything runs
//!
//! Authorizers never see the tool call's arguments directly; the wrapper
//! builds the request from them and passes it in.

mod ciba;
mod device;
mod federated;
mod fga;
mod pending;

pub use ciba::CibaAuthorizer;
pub use device::{DeviceCodeCallback, DeviceFlowAuthorizer};
pub use federated::{FederatedConnectionAuthorizer, ScopeCheck};
pub use fga::FgaGate;
pub use pending::PendingPoller;

use std::time::Duration;

use async_trait::async_trait;
use authpause_auth0::{Auth0Error, FgaError};
use thiserror::Error;

use crate::context::RequestContext;
use crate::credential::Credential;
use crate::interrupt::{Interrupt, InterruptKind};
use crate::request::AuthorizationRequest;
use crate::store::AuthStoreError;
use crate::tool::ToolError;

/// Whether an approval flow waits in-process or interrupts immediately
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowMode {
    /// Poll until approved, denied, expired, or `timeout` elapses
    Blocking { timeout: Option<Duration> },
    /// Raise a pending interrupt and poll on later invocations
    #[default]
    NonBlocking,
}

/// What an authorizer knows about the call it is authorizing
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub tool_call_id: &'a str,
    /// Key under which pending state for this call is stored
    pub store_key: &'a str,
    pub request: &'a RequestContext,
    /// True when the invocation carried a resume marker
    pub resume: bool,
}

/// Why an authorizer could not produce a credential
#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// The user must act; becomes an [`Interrupt`] for the calling tool
    #[error("{message}")]
    Interrupted {
        kind: InterruptKind,
        message: String,
    },

    /// The authorization server could not be used
    #[error("authorization server error: {0}")]
    Transport(#[from] Auth0Error),

    #[error("FGA error: {0}")]
    Fga(#[from] FgaError),

    #[error("auth store error: {0}")]
    Store(#[from] AuthStoreError),
}

impl AuthorizeError {
    /// Interrupt with the kind's default message
    pub fn interrupted(kind: InterruptKind) -> Self {
        let message = kind.default_message();
        AuthorizeError::Interrupted { kind, message }
    }

    pub fn interrupted_with(kind: InterruptKind, message: impl Into<String>) -> Self {
        AuthorizeError::Interrupted {
            kind,
            message: message.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::interrupted(InterruptKind::AccessDenied {
            reason: reason.into(),
        })
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, AuthorizeError::Interrupted { .. })
    }

    /// Convert to a tool error, stamping interrupts with the call id
    pub fn into_tool_error(self, tool_call_id: &str) -> ToolError {
        match self {
            AuthorizeError::Interrupted { kind, message } => {
                Interrupt::with_message(tool_call_id, kind, message).into()
            }
            other => ToolError::Authorization(Box::new(other)),
        }
    }
}

/// A strategy for obtaining a credential
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Obtain a credential for `request` or explain what the user must do
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
    ) -> Result<Credential, AuthorizeError>;

    /// True when scope coverage is checked when the tool reads its
    /// credential instead of inside [`Authorizer::authorize`]
    fn defers_scope_check(&self) -> bool {
        false
    }
}

/// Result of one poll of a pending authorization
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No pending authorization under this key
    Unknown,
    /// Still waiting; carries the interrupt kind to report
    Pending(InterruptKind),
    /// The server asked to poll less often
    SlowDown(InterruptKind),
    Approved(Credential),
    Denied { reason: String },
}

/// Polls stored pending authorizations by key
#[async_trait]
pub trait AuthorizationPoller: Send + Sync {
    async fn poll(&self, key: &str) -> Result<PollOutcome, AuthorizeError>;
}
