//! Authorization interrupts and their wire encoding.
//!
//! An [`Interrupt`] is what a protected tool raises instead of a result when
//! it needs the user to do something first: connect an account, approve a
//! push notification, enter a device code. Interrupts cross process
//! boundaries as a single string:
//!
//! ```text
//! AUTH0_AI_INTERRUPTION:{"code":"FEDERATED_CONNECTION_ERROR","message":"...","toolCallId":"call_1",...}
//! ```
//!
//! The prefix lets a client pick interrupts out of an arbitrary error stream
//! without parsing every error as JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix marking a serialized interrupt inside an error message
pub const INTERRUPT_PREFIX: &str = "AUTH0_AI_INTERRUPTION:";

/// What the client should do once the user has acted on an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeHint {
    /// Re-run the whole conversation turn (used after an account connection
    /// popup completes)
    Reload,
    /// Re-invoke the same tool call with the resume marker attached
    Resume,
}

/// The kind of authorization a tool call is waiting on.
///
/// Serialized with the stable `code` discriminator; kind fields are camelCase
/// siblings of `code` in the wire object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum InterruptKind {
    /// The user must connect (or re-consent) an external account
    #[serde(rename = "FEDERATED_CONNECTION_ERROR", rename_all = "camelCase")]
    FederatedConnection {
        connection: String,
        required_scopes: Vec<String>,
    },

    /// A push approval was sent and has not been answered yet
    #[serde(rename = "AUTHORIZATION_PENDING", rename_all = "camelCase")]
    CibaPending {
        auth_req_id: String,
        interval: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_in: Option<u64>,
    },

    /// The authorization server asked the poller to slow down
    #[serde(rename = "AUTHORIZATION_POLLING", rename_all = "camelCase")]
    CibaPolling { auth_req_id: String, interval: u64 },

    /// A device code is waiting to be entered at the verification URI
    #[serde(rename = "DEVICE_AUTHORIZATION_PENDING", rename_all = "camelCase")]
    DeviceFlowPending {
        verification_uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verification_uri_complete: Option<String>,
        user_code: String,
        interval: u64,
        expires_in: u64,
    },

    /// The user (or a policy) refused the request
    #[serde(rename = "ACCESS_DENIED")]
    AccessDenied { reason: String },

    /// The token vault could not produce a token for a reason the user
    /// cannot fix by connecting an account
    #[serde(rename = "TOKEN_VAULT_ERROR", rename_all = "camelCase")]
    TokenVaultError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection: Option<String>,
        reason: String,
    },
}

impl InterruptKind {
    /// The stable `code` string for this kind
    pub fn code(&self) -> &'static str {
        match self {
            InterruptKind::FederatedConnection { .. } => "FEDERATED_CONNECTION_ERROR",
            InterruptKind::CibaPending { .. } => "AUTHORIZATION_PENDING",
            InterruptKind::CibaPolling { .. } => "AUTHORIZATION_POLLING",
            InterruptKind::DeviceFlowPending { .. } => "DEVICE_AUTHORIZATION_PENDING",
            InterruptKind::AccessDenied { .. } => "ACCESS_DENIED",
            InterruptKind::TokenVaultError { .. } => "TOKEN_VAULT_ERROR",
        }
    }

    /// True when the user has already acted (or cannot act) and no retry
    /// will change the outcome
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InterruptKind::AccessDenied { .. } | InterruptKind::TokenVaultError { .. }
        )
    }

    /// True when an out-of-band approval is still outstanding
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            InterruptKind::CibaPending { .. }
                | InterruptKind::CibaPolling { .. }
                | InterruptKind::DeviceFlowPending { .. }
        )
    }

    /// Polling interval in seconds, for pending kinds
    pub fn interval(&self) -> Option<u64> {
        match self {
            InterruptKind::CibaPending { interval, .. }
            | InterruptKind::CibaPolling { interval, .. }
            | InterruptKind::DeviceFlowPending { interval, .. } => Some(*interval),
            _ => None,
        }
    }

    /// The resume hint a client should follow for this kind
    pub fn resume_hint(&self) -> ResumeHint {
        match self {
            InterruptKind::FederatedConnection { .. } => ResumeHint::Reload,
            _ => ResumeHint::Resume,
        }
    }

    /// A human-readable message for this kind
    pub fn default_message(&self) -> String {
        match self {
            InterruptKind::FederatedConnection { connection, .. } => format!(
                "Authorization required to access the Federated Connection: {}",
                connection
            ),
            InterruptKind::CibaPending { .. } => {
                "Authorization request is pending user approval".to_string()
            }
            InterruptKind::CibaPolling { .. } => {
                "Authorization request is pending, polling slowed down".to_string()
            }
            InterruptKind::DeviceFlowPending {
                verification_uri,
                user_code,
                ..
            } => format!("Visit {} and enter the code {}", verification_uri, user_code),
            InterruptKind::AccessDenied { reason } => format!("Access denied: {}", reason),
            InterruptKind::TokenVaultError { reason, .. } => reason.clone(),
        }
    }
}

/// A structured authorization interrupt raised in place of a tool result.
///
/// Always carries the id of the tool call that raised it so the client can
/// route a resume to the right call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct Interrupt {
    #[serde(flatten)]
    kind: InterruptKind,
    message: String,
    tool_call_id: String,
    resume_hint: ResumeHint,
}

/// Errors decoding an interrupt from the wire
#[derive(Debug, Error)]
pub enum WireError {
    #[error("message does not start with the interrupt prefix")]
    MissingPrefix,

    #[error("malformed interrupt payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl Interrupt {
    /// Create an interrupt with the kind's default message and resume hint
    pub fn new(tool_call_id: impl Into<String>, kind: InterruptKind) -> Self {
        let message = kind.default_message();
        Self::with_message(tool_call_id, kind, message)
    }

    /// Create an interrupt with a custom message
    pub fn with_message(
        tool_call_id: impl Into<String>,
        kind: InterruptKind,
        message: impl Into<String>,
    ) -> Self {
        let resume_hint = kind.resume_hint();
        Self {
            kind,
            message: message.into(),
            tool_call_id: tool_call_id.into(),
            resume_hint,
        }
    }

    pub fn kind(&self) -> &InterruptKind {
        &self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn resume_hint(&self) -> ResumeHint {
        self.resume_hint
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        self.kind.is_pending()
    }

    /// Encode as `AUTH0_AI_INTERRUPTION:` followed by the JSON object
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{}{}", INTERRUPT_PREFIX, serde_json::to_string(self)?))
    }

    /// Decode a wire string produced by [`Interrupt::to_wire`]
    pub fn from_wire(text: &str) -> Result<Self, WireError> {
        let payload = text
            .strip_prefix(INTERRUPT_PREFIX)
            .ok_or(WireError::MissingPrefix)?;
        Ok(serde_json::from_str(payload)?)
    }

    /// Quick check for the interrupt prefix
    pub fn is_wire(text: &str) -> bool {
        text.starts_with(INTERRUPT_PREFIX)
    }

    /// The JSON object form (no prefix)
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Decode the JSON object form
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
