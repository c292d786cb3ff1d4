use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authpause_auth0::{Auth0Client, BackchannelAuthorizeParams, BackchannelAuthorizeResponse};
use chrono::Utc;

use super::pending::{classify_poll, next_wait, PendingPoller, PollStep};
use super::{AuthorizeError, Authorizer, CallContext, FlowMode, PollOutcome};
use crate::credential::Credential;
use crate::request::AuthorizationRequest;
use crate::store::{AuthStore, PendingAuthorization};

/// Client-Initiated Backchannel Authentication.
///
/// Sends the user a push approval carrying the request's binding message.
/// In [`FlowMode::NonBlocking`] (the default) the first invocation raises an
/// `AUTHORIZATION_PENDING` interrupt and each resume polls once, or takes the
/// credential the resumer parked for it; in
/// [`FlowMode::Blocking`] the call polls in-process until the user answers.
///
/// A denial is final: the pending request is discarded and the next
/// invocation starts a new one.
pub struct CibaAuthorizer {
    poller: PendingPoller,
    mode: FlowMode,
    acr_values: Option<String>,
    requested_expiry: Option<u64>,
}

impl CibaAuthorizer {
    pub fn new(client: Auth0Client, store: Arc<dyn AuthStore>) -> Self {
        Self {
            poller: PendingPoller::new(client, store),
            mode: FlowMode::default(),
            acr_values: None,
            requested_expiry: None,
        }
    }

    pub fn with_mode(mut self, mode: FlowMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_acr_values(mut self, acr_values: impl Into<String>) -> Self {
        self.acr_values = Some(acr_values.into());
        self
    }

    /// Ask the server to keep the request open for this many seconds
    pub fn with_requested_expiry(mut self, seconds: u64) -> Self {
        self.requested_expiry = Some(seconds);
        self
    }

    /// The poller sharing this authorizer's client and store
    pub fn poller(&self) -> &PendingPoller {
        &self.poller
    }

    async fn start(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
    ) -> Result<BackchannelAuthorizeResponse, AuthorizeError> {
        let params = BackchannelAuthorizeParams {
            scopes: request.scopes(),
            binding_message: request.binding_message().unwrap_or_default().to_string(),
            user_id: request.user_id().to_string(),
            audience: request.audience().map(str::to_string),
            acr_values: self.acr_values.clone(),
            requested_expiry: self.requested_expiry,
        };

        let response = self.poller.client().backchannel_authorize(&params).await?;
        log::info!(
            "backchannel authorization {} started for {}",
            response.auth_req_id,
            call.tool_call_id
        );
        Ok(response)
    }

    async fn authorize_non_blocking(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
    ) -> Result<Credential, AuthorizeError> {
        match self.poller.poll_call(call).await? {
            PollOutcome::Approved(credential) => return Ok(credential),
            PollOutcome::Pending(kind) => return Err(AuthorizeError::interrupted(kind)),
            PollOutcome::SlowDown(kind) => return Err(AuthorizeError::interrupted(kind)),
            PollOutcome::Denied { reason } => return Err(AuthorizeError::denied(reason)),
            PollOutcome::Unknown => {}
        }

        let response = self.start(request, call).await?;
        let now = Utc::now();
        let pending = PendingAuthorization::ciba(call.tool_call_id, &response, now);
        let kind = pending.pending_kind(now);
        self.poller
            .store()
            .save_pending(call.store_key, pending)
            .await?;
        Err(AuthorizeError::interrupted(kind))
    }

    async fn authorize_blocking(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
        timeout: Option<Duration>,
    ) -> Result<Credential, AuthorizeError> {
        let response = self.start(request, call).await?;
        let auth_req_id = response.auth_req_id.clone();
        let mut pending = PendingAuthorization::ciba(call.tool_call_id, &response, Utc::now());
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            tokio::time::sleep(next_wait(pending.interval_secs, deadline)).await;

            let now = Utc::now();
            if pending.is_expired(now) {
                return Err(AuthorizeError::denied("the authorization request expired"));
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return Err(AuthorizeError::interrupted(pending.pending_kind(now)));
            }

            let result = self.poller.client().poll_ciba(&auth_req_id).await;
            match classify_poll(result, Utc::now())? {
                PollStep::Approved(credential) => return Ok(credential),
                PollStep::Pending => {}
                PollStep::SlowDown => pending.slow_down(now),
                PollStep::Denied(reason) => return Err(AuthorizeError::denied(reason)),
            }
        }
    }
}

#[async_trait]
impl Authorizer for CibaAuthorizer {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
    ) -> Result<Credential, AuthorizeError> {
        match self.mode {
            FlowMode::NonBlocking => self.authorize_non_blocking(request, call).await,
            FlowMode::Blocking { timeout } => self.authorize_blocking(request, call, timeout).await,
        }
    }
}
