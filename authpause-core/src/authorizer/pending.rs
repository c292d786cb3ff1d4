use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authpause_auth0::{Auth0Client, Auth0Error, OAuthErrorCode, TokenResponse};
use chrono::{DateTime, Utc};

use super::{AuthorizationPoller, AuthorizeError, CallContext, PollOutcome};
use crate::credential::Credential;
use crate::store::{AuthStore, PendingAuthorization, PendingFlow};

/// Time to sleep before the next blocking poll: one interval, cut short by
/// `deadline`
pub(crate) fn next_wait(interval_secs: u64, deadline: Option<tokio::time::Instant>) -> Duration {
    let interval = Duration::from_secs(interval_secs);
    match deadline {
        Some(deadline) => {
            interval.min(deadline.saturating_duration_since(tokio::time::Instant::now()))
        }
        None => interval,
    }
}

/// How one token poll ended
#[derive(Debug)]
pub(crate) enum PollStep {
    Approved(Credential),
    Pending,
    SlowDown,
    Denied(String),
}

/// Classify the answer to a CIBA or device token poll.
///
/// Protocol errors end the flow; only transport failures are returned as
/// errors.
pub(crate) fn classify_poll(
    result: Result<TokenResponse, Auth0Error>,
    now: DateTime<Utc>,
) -> Result<PollStep, AuthorizeError> {
    let err = match result {
        Ok(token) => return Ok(PollStep::Approved(Credential::from_token_response(&token, now))),
        Err(err) => err,
    };

    let oauth = match err.oauth() {
        Some(oauth) => oauth,
        None => return Err(AuthorizeError::Transport(err)),
    };

    let step = match &oauth.code {
        OAuthErrorCode::AuthorizationPending => PollStep::Pending,
        OAuthErrorCode::SlowDown => PollStep::SlowDown,
        OAuthErrorCode::AccessDenied => PollStep::Denied(
            oauth
                .description
                .clone()
                .unwrap_or_else(|| "the user denied the authorization request".to_string()),
        ),
        OAuthErrorCode::ExpiredToken => {
            PollStep::Denied("the authorization request expired".to_string())
        }
        _ => PollStep::Denied(oauth.to_string()),
    };
    Ok(step)
}

/// Polls pending CIBA and device authorizations kept in an [`AuthStore`].
///
/// Enforces the polling interval locally: a poll before `next_poll_at`
/// reports pending without calling the server.
#[derive(Clone)]
pub struct PendingPoller {
    client: Auth0Client,
    store: Arc<dyn AuthStore>,
}

impl PendingPoller {
    pub fn new(client: Auth0Client, store: Arc<dyn AuthStore>) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    pub(crate) fn client(&self) -> &Auth0Client {
        &self.client
    }

    /// Poll on behalf of a call. A resumed call first takes any credential
    /// the resumer parked under its key.
    pub(crate) async fn poll_call(
        &self,
        call: &CallContext<'_>,
    ) -> Result<PollOutcome, AuthorizeError> {
        if call.resume {
            if let Some(credential) = self
                .store
                .take_live_credential(call.store_key, Utc::now())
                .await?
            {
                log::debug!("using credential parked for {}", call.tool_call_id);
                return Ok(PollOutcome::Approved(credential));
            }
        }

        let outcome = self.poll(call.store_key).await?;
        if call.resume && outcome == PollOutcome::Unknown {
            log::warn!(
                "resumed call {} has no pending authorization under '{}'; starting a new request",
                call.tool_call_id,
                call.store_key
            );
        }
        Ok(outcome)
    }

    /// Poll an already-loaded pending record
    pub(crate) async fn poll_record(
        &self,
        key: &str,
        mut pending: PendingAuthorization,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome, AuthorizeError> {
        if pending.is_expired(now) {
            self.store.remove_pending(key).await?;
            log::debug!("pending authorization {} expired", key);
            return Ok(PollOutcome::Denied {
                reason: "the authorization request expired".to_string(),
            });
        }

        if !pending.is_poll_due(now) {
            return Ok(PollOutcome::Pending(pending.pending_kind(now)));
        }

        let result = match &pending.flow {
            PendingFlow::Ciba { auth_req_id } => self.client.poll_ciba(auth_req_id).await,
            PendingFlow::Device { device_code, .. } => self.client.poll_device(device_code).await,
        };

        match classify_poll(result, now)? {
            PollStep::Approved(credential) => {
                self.store.remove_pending(key).await?;
                log::info!("authorization {} approved", key);
                Ok(PollOutcome::Approved(credential))
            }
            PollStep::Pending => {
                pending.schedule_next(now);
                let kind = pending.pending_kind(now);
                self.store.save_pending(key, pending).await?;
                Ok(PollOutcome::Pending(kind))
            }
            PollStep::SlowDown => {
                pending.slow_down(now);
                log::debug!(
                    "authorization {} slowed down to {}s",
                    key,
                    pending.interval_secs
                );
                let kind = pending.slow_down_kind(now);
                self.store.save_pending(key, pending).await?;
                Ok(PollOutcome::SlowDown(kind))
            }
            PollStep::Denied(reason) => {
                self.store.remove_pending(key).await?;
                log::info!("authorization {} denied: {}", key, reason);
                Ok(PollOutcome::Denied { reason })
            }
        }
    }
}

#[async_trait]
impl AuthorizationPoller for PendingPoller {
    async fn poll(&self, key: &str) -> Result<PollOutcome, AuthorizeError> {
        match self.store.load_pending(key).await? {
            Some(pending) => self.poll_record(key, pending, Utc::now()).await,
            None => Ok(PollOutcome::Unknown),
        }
    }
}
