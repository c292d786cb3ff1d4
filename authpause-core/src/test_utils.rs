//! Test utilities for authpause-core.
//!
//! Mock implementations for exercising authorized tools without an
//! authorization server.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! authpause-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use authpause_core::test_utils::{MockAuthorizer, TokenEchoTool};
//! use authpause_core::{AuthorizationRequest, AuthorizedTool, Credential};
//!
//! let authorizer = Arc::new(MockAuthorizer::new());
//! authorizer.push_ok(Credential::new("token"));
//!
//! let tool = AuthorizedTool::new(TokenEchoTool::new("echo"), authorizer, |_input, ctx| {
//!     AuthorizationRequest::builder(ctx.user_id()).scope("read").build()
//! });
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::authorizer::{AuthorizeError, Authorizer, CallContext};
use crate::context::ToolContext;
use crate::credential::Credential;
use crate::events::{AuthEvent, AuthHook};
use crate::request::AuthorizationRequest;
use crate::resumer::{InterruptedThread, ResumeValue, ThreadFilter, ThreadStore, ThreadStoreError};
use crate::tool::{Tool, ToolError, ToolResult};

/// An authorizer answering from a script.
///
/// Outcomes are returned in order; once the script is exhausted the
/// fallback (if set) is returned, otherwise the call is denied.
#[derive(Default)]
pub struct MockAuthorizer {
    outcomes: Mutex<VecDeque<Result<Credential, AuthorizeError>>>,
    fallback: Option<Credential>,
    requests: Mutex<Vec<AuthorizationRequest>>,
    deferred: bool,
}

impl MockAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve every call with `credential` once the script runs out
    pub fn approving(credential: Credential) -> Self {
        Self {
            fallback: Some(credential),
            ..Default::default()
        }
    }

    /// Report scope checks as deferred to the credential getter
    pub fn deferring_scope_check(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn push_ok(&self, credential: Credential) {
        self.outcomes.lock().push_back(Ok(credential));
    }

    pub fn push_err(&self, err: AuthorizeError) {
        self.outcomes.lock().push_back(Err(err));
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<AuthorizationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
        _call: &CallContext<'_>,
    ) -> Result<Credential, AuthorizeError> {
        self.requests.lock().push(request.clone());
        if let Some(outcome) = self.outcomes.lock().pop_front() {
            return outcome;
        }
        match &self.fallback {
            Some(credential) => Ok(credential.clone()),
            None => Err(AuthorizeError::denied("no scripted outcome")),
        }
    }

    fn defers_scope_check(&self) -> bool {
        self.deferred
    }
}

/// Input for [`TokenEchoTool`]
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TokenEchoInput {
    pub text: String,
}

/// A tool that answers `<text>:<access token>` and counts its executions
pub struct TokenEchoTool {
    name: String,
    executions: AtomicUsize,
}

impl TokenEchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: AtomicUsize::new(0),
        }
    }

    /// How many times the body ran with a credential
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Tool for TokenEchoTool {
    type Input = TokenEchoInput;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo the input text with the bound access token"
    }

    fn execute(
        &self,
        ctx: &ToolContext,
        input: Self::Input,
    ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send {
        let token = ctx.access_token().map(str::to_string);
        async move {
            let token = token?;
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::text(format!("{}:{}", input.text, token)))
        }
    }
}

/// In-memory thread store for resumer tests
#[derive(Default)]
pub struct MockThreadStore {
    threads: Mutex<Vec<InterruptedThread>>,
    resumes: Mutex<Vec<(String, ResumeValue)>>,
    vanishing: Mutex<HashSet<String>>,
}

impl MockThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a thread
    pub fn add(&self, thread: InterruptedThread) {
        self.threads.lock().push(thread);
    }

    /// Make the thread disappear when a resume is attempted
    pub fn vanish_on_resume(&self, thread_id: &str) {
        self.vanishing.lock().insert(thread_id.to_string());
    }

    /// Resumes applied so far, in order
    pub fn resumes(&self) -> Vec<(String, ResumeValue)> {
        self.resumes.lock().clone()
    }
}

#[async_trait]
impl ThreadStore for MockThreadStore {
    async fn list_interrupted(
        &self,
        filter: &ThreadFilter,
    ) -> Result<Vec<InterruptedThread>, ThreadStoreError> {
        Ok(self
            .threads
            .lock()
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn resume(&self, thread_id: &str, value: ResumeValue) -> Result<(), ThreadStoreError> {
        let mut threads = self.threads.lock();
        let position = threads.iter().position(|t| t.thread_id == thread_id);

        if self.vanishing.lock().contains(thread_id) {
            if let Some(index) = position {
                threads.remove(index);
            }
            return Err(ThreadStoreError::NotFound(thread_id.to_string()));
        }

        match position {
            Some(index) => {
                threads.remove(index);
                self.resumes.lock().push((thread_id.to_string(), value));
                Ok(())
            }
            None => Err(ThreadStoreError::NotFound(thread_id.to_string())),
        }
    }
}

/// Hook that collects events for later assertions.
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<AuthEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().clone()
    }

    /// Event type names, in order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(Self::event_type_name).collect()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.event_types().iter().any(|t| *t == event_type)
    }

    fn event_type_name(event: &AuthEvent) -> &'static str {
        match event {
            AuthEvent::ToolRequested { .. } => "tool_requested",
            AuthEvent::ToolExecuting { .. } => "tool_executing",
            AuthEvent::ToolCompleted { .. } => "tool_completed",
            AuthEvent::ToolFailed { .. } => "tool_failed",
            AuthEvent::AuthorizationRequested { .. } => "authorization_requested",
            AuthEvent::StateChanged { .. } => "state_changed",
            AuthEvent::Interrupted { .. } => "interrupted",
        }
    }
}

impl AuthHook for EventCollector {
    fn on_event(&self, event: &AuthEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::interrupt::{Interrupt, InterruptKind};

    #[tokio::test]
    async fn test_mock_authorizer_script_then_fallback() {
        let authorizer = MockAuthorizer::approving(Credential::new("fallback"));
        authorizer.push_err(AuthorizeError::denied("first"));

        let request = RequestContext::new("u");
        let call = CallContext {
            tool_call_id: "c",
            store_key: "c",
            request: &request,
            resume: false,
        };
        let req = AuthorizationRequest::builder("u").build();

        assert!(authorizer.authorize(&req, &call).await.is_err());
        let credential = authorizer.authorize(&req, &call).await.unwrap();
        assert_eq!(credential.access_token, "fallback");
        assert_eq!(authorizer.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_thread_store_resume_removes() {
        let store = MockThreadStore::new();
        store.add(InterruptedThread::new(
            "t1",
            Interrupt::new(
                "c",
                InterruptKind::AccessDenied {
                    reason: "r".into(),
                },
            ),
        ));

        let filter = ThreadFilter::default();
        assert_eq!(store.list_interrupted(&filter).await.unwrap().len(), 1);

        let value = ResumeValue::Approved {
            tool_call_id: "c".into(),
        };
        store.resume("t1", value.clone()).await.unwrap();
        assert!(store.list_interrupted(&filter).await.unwrap().is_empty());
        assert!(matches!(
            store.resume("t1", value).await,
            Err(ThreadStoreError::NotFound(_))
        ));
    }
}
