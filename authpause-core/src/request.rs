//! Authorization requests built per tool invocation.

use std::collections::BTreeSet;

/// What a tool call needs authorized.
///
/// Built fresh for every invocation attempt, usually from the call's
/// arguments (the binding message for a trade is computed from the quantity
/// and ticker, not configured statically). Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    user_id: String,
    scopes: BTreeSet<String>,
    audience: Option<String>,
    binding_message: Option<String>,
    connection: Option<String>,
}

impl AuthorizationRequest {
    /// Start building a request on behalf of `user_id`
    pub fn builder(user_id: impl Into<String>) -> AuthorizationRequestBuilder {
        AuthorizationRequestBuilder {
            request: AuthorizationRequest {
                user_id: user_id.into(),
                scopes: BTreeSet::new(),
                audience: None,
                binding_message: None,
                connection: None,
            },
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Requested scopes, sorted
    pub fn scopes(&self) -> Vec<String> {
        self.scopes.iter().cloned().collect()
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    pub fn binding_message(&self) -> Option<&str> {
        self.binding_message.as_deref()
    }

    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }
}

/// Builder for [`AuthorizationRequest`]
#[derive(Debug, Clone)]
pub struct AuthorizationRequestBuilder {
    request: AuthorizationRequest,
}

impl AuthorizationRequestBuilder {
    /// Add one scope
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.request.scopes.insert(scope.into());
        self
    }

    /// Add several scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request
            .scopes
            .extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.request.audience = Some(audience.into());
        self
    }

    pub fn binding_message(mut self, message: impl Into<String>) -> Self {
        self.request.binding_message = Some(message.into());
        self
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.request.connection = Some(connection.into());
        self
    }

    pub fn build(self) -> AuthorizationRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_fields() {
        let request = AuthorizationRequest::builder("auth0|alice")
            .scope("stock:trade")
            .scopes(["openid", "stock:trade"])
            .audience("https://api.example.com")
            .binding_message("Do you want to buy 10 shares of ZEKO")
            .build();

        assert_eq!(request.user_id(), "auth0|alice");
        assert_eq!(request.scopes(), vec!["openid", "stock:trade"]);
        assert_eq!(request.audience(), Some("https://api.example.com"));
        assert_eq!(
            request.binding_message(),
            Some("Do you want to buy 10 shares of ZEKO")
        );
        assert_eq!(request.connection(), None);
    }
}
