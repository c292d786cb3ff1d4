use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authpause_auth0::{Auth0Client, DeviceAuthorizationParams, DeviceCodeResponse};
use chrono::Utc;

use super::pending::{classify_poll, next_wait, PendingPoller, PollStep};
use super::{AuthorizeError, Authorizer, CallContext, FlowMode, PollOutcome};
use crate::credential::Credential;
use crate::request::AuthorizationRequest;
use crate::store::{AuthStore, PendingAuthorization};

/// Called with the device code so the host can show it to the user
pub type DeviceCodeCallback = Arc<dyn Fn(&DeviceCodeResponse) + Send + Sync>;

/// OAuth 2.0 Device Authorization Grant (RFC 8628).
///
/// The user enters a short code at a verification URI on another device.
/// Non-blocking by default: the first invocation raises
/// `DEVICE_AUTHORIZATION_PENDING` and later invocations poll at most once
/// per interval.
pub struct DeviceFlowAuthorizer {
    poller: PendingPoller,
    mode: FlowMode,
    on_code: Option<DeviceCodeCallback>,
}

impl DeviceFlowAuthorizer {
    pub fn new(client: Auth0Client, store: Arc<dyn AuthStore>) -> Self {
        Self {
            poller: PendingPoller::new(client, store),
            mode: FlowMode::default(),
            on_code: None,
        }
    }

    pub fn with_mode(mut self, mode: FlowMode) -> Self {
        self.mode = mode;
        self
    }

    /// Register a callback invoked whenever a new device code is issued
    pub fn on_code(mut self, callback: impl Fn(&DeviceCodeResponse) + Send + Sync + 'static) -> Self {
        self.on_code = Some(Arc::new(callback));
        self
    }

    pub fn poller(&self) -> &PendingPoller {
        &self.poller
    }

    async fn start(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
    ) -> Result<DeviceCodeResponse, AuthorizeError> {
        let params = DeviceAuthorizationParams {
            scopes: request.scopes(),
            audience: request.audience().map(str::to_string),
        };

        let response = self.poller.client().device_authorization(&params).await?;
        log::info!(
            "device authorization started for {}; user code {}",
            call.tool_call_id,
            response.user_code
        );
        if let Some(callback) = &self.on_code {
            callback(&response);
        }
        Ok(response)
    }

    async fn authorize_non_blocking(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
    ) -> Result<Credential, AuthorizeError> {
        match self.poller.poll_call(call).await? {
            PollOutcome::Approved(credential) => return Ok(credential),
            PollOutcome::Pending(kind) | PollOutcome::SlowDown(kind) => {
                return Err(AuthorizeError::interrupted(kind))
            }
            PollOutcome::Denied { reason } => return Err(AuthorizeError::denied(reason)),
            PollOutcome::Unknown => {}
        }

        let response = self.start(request, call).await?;
        let now = Utc::now();
        let pending = PendingAuthorization::device(call.tool_call_id, &response, now);
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
        let mut pending = PendingAuthorization::device(call.tool_call_id, &response, Utc::now());
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            tokio::time::sleep(next_wait(pending.interval_secs, deadline)).await;

            let now = Utc::now();
            if pending.is_expired(now) {
                return Err(AuthorizeError::denied("the device code expired"));
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return Err(AuthorizeError::interrupted(pending.pending_kind(now)));
            }

            let result = self.poller.client().poll_device(&response.device_code).await;
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
impl Authorizer for DeviceFlowAuthorizer {
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
