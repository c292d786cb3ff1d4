//! Per-request and per-tool-call context.
//!
//! A [`RequestContext`] describes who a request runs for. A [`ToolContext`]
//! scopes it to one tool call: its id, an optional resume marker, and, once
//! an authorized wrapper has obtained one, the bound credential. Contexts are
//! passed explicitly down the call chain so concurrent tool calls in one
//! request never see each other's credentials.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::credential::{missing_scopes, scope_union, Credential};
use crate::events::{AuthEvent, HookRegistry};
use crate::interrupt::{Interrupt, InterruptKind};
use crate::tool::ToolError;

/// Who a request runs for, plus host-supplied attributes
#[derive(Clone, Default)]
pub struct RequestContext {
    user_id: String,
    thread_id: Option<String>,
    refresh_token: Option<String>,
    attributes: BTreeMap<String, Value>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("user_id", &self.user_id)
            .field("thread_id", &self.thread_id)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// The user's refresh token, used for federated token exchange
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Marks a tool invocation as the continuation of an earlier interrupt.
///
/// On the wire this is the prior tool result augmented with
/// `continueInterruption: true` plus any data the client collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeMarker {
    data: Map<String, Value>,
}

impl ResumeMarker {
    pub const FIELD: &'static str = "continueInterruption";

    pub fn new() -> Self {
        Self::default()
    }

    /// Attach client-provided data
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Detect the marker in a prior tool result
    pub fn detect(prior_result: &Value) -> Option<Self> {
        let object = prior_result.as_object()?;
        if object.get(Self::FIELD).and_then(Value::as_bool) != Some(true) {
            return None;
        }

        let data = object
            .iter()
            .filter(|(k, _)| k.as_str() != Self::FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self { data })
    }

    /// The prior result form: `{continueInterruption: true, ...data}`
    pub fn to_value(&self) -> Value {
        let mut object = self.data.clone();
        object.insert(Self::FIELD.to_string(), Value::Bool(true));
        Value::Object(object)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

/// A credential bound to one tool call, with what it was requested for
#[derive(Debug, Clone)]
pub(crate) struct BoundCredential {
    pub credential: Credential,
    pub required_scopes: Vec<String>,
    pub connection: Option<String>,
    pub deferred_scope_check: bool,
}

/// Context for one tool invocation.
///
/// Deliberately not `Clone`: each call gets its own, and an authorized
/// wrapper derives a new bound context from it rather than sharing one.
pub struct ToolContext {
    request: RequestContext,
    tool_call_id: String,
    resume: Option<ResumeMarker>,
    bound: Option<BoundCredential>,
    hooks: Option<HookRegistry>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("request", &self.request)
            .field("tool_call_id", &self.tool_call_id)
            .field("resume", &self.resume)
            .field("bound", &self.bound.is_some())
            .finish()
    }
}

impl ToolContext {
    pub fn new(request: RequestContext, tool_call_id: impl Into<String>) -> Self {
        Self {
            request,
            tool_call_id: tool_call_id.into(),
            resume: None,
            bound: None,
            hooks: None,
        }
    }

    /// Mark this invocation as a resume
    pub fn with_resume(mut self, marker: ResumeMarker) -> Self {
        self.resume = Some(marker);
        self
    }

    pub(crate) fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn user_id(&self) -> &str {
        self.request.user_id()
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn resume(&self) -> Option<&ResumeMarker> {
        self.resume.as_ref()
    }

    pub fn is_resume(&self) -> bool {
        self.resume.is_some()
    }

    /// True once an authorized wrapper has bound a credential
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Derive the context the inner tool runs with.
    ///
    /// Fails if a credential is already bound: authorized tools do not nest.
    pub(crate) fn bind(
        &self,
        requested_by: &str,
        bound: BoundCredential,
    ) -> Result<ToolContext, ToolError> {
        if self.is_bound() {
            return Err(ToolError::NestedAuthorization {
                active: self.tool_call_id.clone(),
                requested: requested_by.to_string(),
            });
        }

        Ok(ToolContext {
            request: self.request.clone(),
            tool_call_id: self.tool_call_id.clone(),
            resume: self.resume.clone(),
            bound: Some(bound),
            hooks: self.hooks.clone(),
        })
    }

    /// The credential bound to this call.
    ///
    /// When the authorizer deferred its scope check, coverage is validated
    /// here and a missing scope surfaces as a federated connection interrupt
    /// asking for the union of granted and required scopes.
    pub fn credential(&self) -> Result<&Credential, ToolError> {
        let bound = self
            .bound
            .as_ref()
            .ok_or_else(|| ToolError::MissingCredential(self.tool_call_id.clone()))?;

        if bound.deferred_scope_check {
            let missing = missing_scopes(&bound.credential.scopes, &bound.required_scopes);
            if !missing.is_empty() {
                log::debug!(
                    "credential for {} lacks scopes {:?}",
                    self.tool_call_id,
                    missing
                );
                return Err(self
                    .interrupt(InterruptKind::FederatedConnection {
                        connection: bound.connection.clone().unwrap_or_default(),
                        required_scopes: scope_union(
                            &bound.credential.scopes,
                            &bound.required_scopes,
                        ),
                    })
                    .into());
            }
        }

        Ok(&bound.credential)
    }

    /// Shorthand for the bound access token
    pub fn access_token(&self) -> Result<&str, ToolError> {
        Ok(&self.credential()?.access_token)
    }

    /// Build an interrupt correlated with this call
    pub fn interrupt(&self, kind: InterruptKind) -> Interrupt {
        Interrupt::new(self.tool_call_id.clone(), kind)
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        if let Some(hooks) = &self.hooks {
            hooks.emit(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bound(scopes: &[&str], required: &[&str], deferred: bool) -> BoundCredential {
        BoundCredential {
            credential: Credential::new("at").with_scopes(scopes.iter().copied()),
            required_scopes: required.iter().map(|s| s.to_string()).collect(),
            connection: Some("google-oauth2".into()),
            deferred_scope_check: deferred,
        }
    }

    #[test]
    fn test_resume_marker_detect() {
        let prior = json!({"continueInterruption": true, "approved": "yes"});
        let marker = ResumeMarker::detect(&prior).unwrap();
        assert_eq!(marker.data().get("approved"), Some(&json!("yes")));
        assert_eq!(marker.to_value(), prior);

        assert!(ResumeMarker::detect(&json!({"continueInterruption": false})).is_none());
        assert!(ResumeMarker::detect(&json!("text")).is_none());
        assert!(ResumeMarker::detect(&json!({"other": 1})).is_none());
    }

    #[test]
    fn test_unbound_credential_is_error() {
        let ctx = ToolContext::new(RequestContext::new("u"), "call_1");
        assert!(matches!(
            ctx.credential(),
            Err(ToolError::MissingCredential(id)) if id == "call_1"
        ));
    }

    #[test]
    fn test_bind_rejects_nesting() {
        let ctx = ToolContext::new(RequestContext::new("u"), "outer");
        let inner = ctx.bind("outer_tool", bound(&["a"], &["a"], false)).unwrap();
        assert!(inner.is_bound());
        assert!(!ctx.is_bound());

        let err = inner.bind("inner_tool", bound(&["a"], &["a"], false)).unwrap_err();
        assert!(matches!(
            err,
            ToolError::NestedAuthorization { ref active, ref requested }
                if active == "outer" && requested == "inner_tool"
        ));
    }

    #[test]
    fn test_deferred_scope_check_interrupts_on_access() {
        let ctx = ToolContext::new(RequestContext::new("u"), "call_9");
        let bound_ctx = ctx
            .bind("calendar", bound(&["openid"], &["calendar.freebusy"], true))
            .unwrap();

        let err = bound_ctx.credential().unwrap_err();
        let interrupt = err.interrupt().unwrap();
        assert_eq!(interrupt.tool_call_id(), "call_9");
        assert_eq!(
            interrupt.kind(),
            &InterruptKind::FederatedConnection {
                connection: "google-oauth2".into(),
                required_scopes: vec!["calendar.freebusy".into(), "openid".into()],
            }
        );
    }

    #[test]
    fn test_eager_bound_credential_returned_as_is() {
        let ctx = ToolContext::new(RequestContext::new("u"), "c");
        let bound_ctx = ctx.bind("t", bound(&[], &["x"], false)).unwrap();
        assert_eq!(bound_ctx.access_token().unwrap(), "at");
    }

    #[test]
    fn test_request_context_debug_redacts_refresh_token() {
        let request = RequestContext::new("u").with_refresh_token("rt-secret");
        assert_eq!(request.refresh_token(), Some("rt-secret"));
        assert!(!format!("{:?}", request).contains("rt-secret"));
    }
}
