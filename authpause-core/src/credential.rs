//! Credentials produced by authorizers and scope arithmetic.

use std::collections::BTreeSet;

use authpause_auth0::TokenResponse;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An access token obtained by one authorization attempt.
///
/// `scopes` holds what the token endpoint reported as granted and is used to
/// validate coverage of the scopes a tool requires.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl Credential {
    /// Create a credential with just an access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: None,
            expires_at: None,
            scopes: Vec::new(),
            token_type: None,
        }
    }

    /// Set the granted scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the expiry from a lifetime in seconds, relative to `now`
    pub fn with_expires_in(mut self, seconds: u64, now: DateTime<Utc>) -> Self {
        self.expires_at = Some(after_secs(now, seconds));
        self
    }

    /// Build a credential from a token endpoint response
    pub fn from_token_response(response: &TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token.clone(),
            id_token: response.id_token.clone(),
            expires_at: response
                .expires_in
                .map(|secs| after_secs(now, secs)),
            scopes: response.scopes(),
            token_type: response.token_type.clone(),
        }
    }

    /// True when the credential has an expiry in the past
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// True when every required scope was granted
    pub fn covers<S: AsRef<str>>(&self, required: &[S]) -> bool {
        missing_scopes(&self.scopes, required).is_empty()
    }
}

/// `now` plus a server-sent number of seconds, saturating at the latest
/// representable time
pub(crate) fn after_secs(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Scopes needed to re-authorize: `current ∪ requested`, sorted and deduplicated.
///
/// Re-applying the union to a result that already contains `requested`
/// returns it unchanged.
pub fn scope_union<A: AsRef<str>, B: AsRef<str>>(current: &[A], requested: &[B]) -> Vec<String> {
    current
        .iter()
        .map(|s| s.as_ref())
        .chain(requested.iter().map(|s| s.as_ref()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Required scopes that `granted` does not contain
pub fn missing_scopes<A: AsRef<str>, B: AsRef<str>>(granted: &[A], required: &[B]) -> Vec<String> {
    let granted: BTreeSet<&str> = granted.iter().map(|s| s.as_ref()).collect();
    required
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !granted.contains(s))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_expires_in_saturates() {
        let now = Utc::now();
        let credential = Credential::new("t").with_expires_in(u64::MAX, now);
        assert_eq!(credential.expires_at, Some(DateTime::<Utc>::MAX_UTC));
        assert!(!credential.is_expired(now));
    }

    #[test]
    fn test_scope_union_basic() {
        let current = ["email", "openid"];
        let requested = ["calendar.freebusy", "email"];
        assert_eq!(
            scope_union(&current, &requested),
            vec!["calendar.freebusy", "email", "openid"]
        );
    }

    #[test]
    fn test_scope_union_empty_current() {
        let current: [&str; 0] = [];
        assert_eq!(
            scope_union(&current, &["calendar.freebusy"]),
            vec!["calendar.freebusy"]
        );
    }

    #[test]
    fn test_scope_union_is_idempotent() {
        let cases: Vec<(Vec<&str>, Vec<&str>)> = vec![
            (vec![], vec!["a"]),
            (vec!["b", "a"], vec!["a"]),
            (vec!["x", "y", "z"], vec!["y", "w"]),
            (vec!["repo"], vec![]),
        ];

        for (current, requested) in cases {
            let once = scope_union(&current, &requested);
            let twice = scope_union(&once, &requested);
            assert_eq!(once, twice, "union not idempotent for {:?}", current);
        }
    }

    #[test]
    fn test_scope_union_superset_returns_current() {
        let current = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(scope_union(&current, &["b", "c"]), current);
    }

    #[test]
    fn test_covers_and_missing() {
        let credential = Credential::new("at").with_scopes(["openid", "calendar.freebusy"]);
        assert!(credential.covers(&["calendar.freebusy"]));
        assert!(credential.covers::<&str>(&[]));
        assert!(!credential.covers(&["calendar.events"]));
        assert_eq!(
            missing_scopes(&credential.scopes, &["calendar.events", "openid"]),
            vec!["calendar.events"]
        );
    }

    #[test]
    fn test_from_token_response() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "at".into(),
            id_token: Some("idt".into()),
            refresh_token: None,
            token_type: Some("Bearer".into()),
            expires_in: Some(60),
            scope: Some("openid stock:trade".into()),
        };

        let credential = Credential::from_token_response(&response, now);
        assert_eq!(credential.access_token, "at");
        assert_eq!(credential.scopes, vec!["openid", "stock:trade"]);
        assert_eq!(credential.expires_at, Some(now + Duration::seconds(60)));
        assert!(!credential.is_expired(now));
        assert!(credential.is_expired(now + Duration::seconds(61)));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credential = Credential::new("secret-token");
        assert!(!format!("{:?}", credential).contains("secret-token"));
    }
}
