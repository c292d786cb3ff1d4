//! Lifecycle of one authorized tool call.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an authorized tool call is in its lifecycle.
///
/// ```text
/// Idle ─► AuthorizationRequested ─┬─► Approved ─► Executing ─┬─► Completed
///                                 ├─► Pending ─┬─► Approved   └─► Failed
///                                 │            ├─► Pending
///                                 │            └─► Denied
///                                 ├─► Denied
///                                 └─► Failed
/// ```
///
/// `Pending` is left only when a resume re-enters the call and polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    Idle,
    AuthorizationRequested,
    Pending,
    Approved,
    Executing,
    Completed,
    Denied,
    Failed,
}

/// An edge the lifecycle does not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid authorization transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: AuthorizationState,
    pub to: AuthorizationState,
}

impl AuthorizationState {
    /// True for states a call never leaves
    pub fn is_final(self) -> bool {
        matches!(
            self,
            AuthorizationState::Completed | AuthorizationState::Denied | AuthorizationState::Failed
        )
    }

    pub fn can_transition_to(self, next: AuthorizationState) -> bool {
        use AuthorizationState::*;

        matches!(
            (self, next),
            (Idle, AuthorizationRequested)
                | (AuthorizationRequested, Approved)
                | (AuthorizationRequested, Pending)
                | (AuthorizationRequested, Denied)
                | (AuthorizationRequested, Failed)
                | (Pending, Pending)
                | (Pending, Approved)
                | (Pending, Denied)
                | (Pending, Failed)
                | (Approved, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }

    pub fn transition(self, next: AuthorizationState) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthorizationState::Idle => "idle",
            AuthorizationState::AuthorizationRequested => "authorization_requested",
            AuthorizationState::Pending => "pending",
            AuthorizationState::Approved => "approved",
            AuthorizationState::Executing => "executing",
            AuthorizationState::Completed => "completed",
            AuthorizationState::Denied => "denied",
            AuthorizationState::Failed => "failed",
        };
        f.write_str(name)
    }
}
