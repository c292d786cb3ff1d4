use async_trait::async_trait;
use authpause_auth0::{Auth0Client, Auth0Error, OAuthErrorCode, TokenExchangeParams};
use chrono::Utc;

use super::{AuthorizeError, Authorizer, CallContext};
use crate::credential::{missing_scopes, scope_union, Credential};
use crate::interrupt::InterruptKind;
use crate::request::AuthorizationRequest;

/// When a federated credential's scopes are checked against the request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScopeCheck {
    /// Inside `authorize`, before the tool body runs
    #[default]
    Eager,
    /// When the tool first reads its credential
    Deferred,
}

/// Exchanges the user's refresh token for an access token to an external
/// provider through a federated connection.
///
/// Any exchange failure the user can fix by (re)connecting the account
/// becomes a `FederatedConnection` interrupt listing the scopes to request.
pub struct FederatedConnectionAuthorizer {
    client: Auth0Client,
    connection: String,
    scope_check: ScopeCheck,
}

impl FederatedConnectionAuthorizer {
    pub fn new(client: Auth0Client, connection: impl Into<String>) -> Self {
        Self {
            client,
            connection: connection.into(),
            scope_check: ScopeCheck::default(),
        }
    }

    pub fn with_scope_check(mut self, scope_check: ScopeCheck) -> Self {
        self.scope_check = scope_check;
        self
    }

    fn connection_interrupt(
        connection: &str,
        current: &[String],
        requested: &[String],
        message: Option<String>,
    ) -> AuthorizeError {
        let kind = InterruptKind::FederatedConnection {
            connection: connection.to_string(),
            required_scopes: scope_union(current, requested),
        };
        match message {
            Some(message) => AuthorizeError::interrupted_with(kind, message),
            None => AuthorizeError::interrupted(kind),
        }
    }
}

#[async_trait]
impl Authorizer for FederatedConnectionAuthorizer {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        call: &CallContext<'_>,
    ) -> Result<Credential, AuthorizeError> {
        let connection = request.connection().unwrap_or(&self.connection);
        let requested = request.scopes();
        let no_scopes: [String; 0] = [];

        let refresh_token = match call.request.refresh_token() {
            Some(token) => token,
            None => {
                log::debug!(
                    "no refresh token for {}; asking the user to connect {}",
                    call.tool_call_id,
                    connection
                );
                return Err(Self::connection_interrupt(
                    connection, &no_scopes, &requested, None,
                ));
            }
        };

        let params = TokenExchangeParams {
            refresh_token: refresh_token.to_string(),
            connection: connection.to_string(),
            login_hint: None,
        };

        let token = match self.client.token_exchange(&params).await {
            Ok(token) => token,
            Err(Auth0Error::OAuth(oauth)) => {
                log::info!(
                    "token exchange for {} on {} failed: {}",
                    call.tool_call_id,
                    connection,
                    oauth
                );
                return match oauth.code {
                    OAuthErrorCode::InvalidClient => Err(AuthorizeError::interrupted_with(
                        InterruptKind::TokenVaultError {
                            connection: Some(connection.to_string()),
                            reason: oauth.to_string(),
                        },
                        oauth.to_string(),
                    )),
                    _ => Err(Self::connection_interrupt(
                        connection,
                        &no_scopes,
                        &requested,
                        oauth.description.clone(),
                    )),
                };
            }
            Err(err) => return Err(AuthorizeError::Transport(err)),
        };

        let credential = Credential::from_token_response(&token, Utc::now());

        if self.scope_check == ScopeCheck::Eager {
            let missing = missing_scopes(&credential.scopes, &requested);
            if !missing.is_empty() {
                log::info!(
                    "token for {} on {} lacks scopes {:?}",
                    call.tool_call_id,
                    connection,
                    missing
                );
                return Err(Self::connection_interrupt(
                    connection,
                    &credential.scopes,
                    &requested,
                    None,
                ));
            }
        }

        Ok(credential)
    }

    fn defers_scope_check(&self) -> bool {
        self.scope_check == ScopeCheck::Deferred
    }
}
