//! Tool dispatch for a host agent loop.
//!
//! The runner owns the registered tools, turns each incoming call into a
//! [`ToolContext`], and reports progress through [`AuthEvent`]s.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::context::{RequestContext, ResumeMarker, ToolContext};
use crate::events::{AuthEvent, AuthHook, HookId, HookRegistry};
use crate::tool::{box_tool, DynTool, Tool, ToolError, ToolResult};

/// Default number of tool calls `run_many` executes at once
pub const DEFAULT_MAX_CONCURRENT_TOOLS: usize = 8;

/// A single tool invocation as received from the model or client
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    /// Result stored for this call by an earlier, interrupted attempt.
    /// Carries the resume marker when the client is continuing.
    pub prior_result: Option<Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            prior_result: None,
        }
    }

    pub fn with_prior_result(mut self, prior_result: Value) -> Self {
        self.prior_result = Some(prior_result);
        self
    }
}

/// Summary of a registered tool
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Builder for [`ToolRunner`]
pub struct ToolRunnerBuilder {
    tools: Vec<Box<dyn DynTool>>,
    max_concurrent_tools: usize,
}

impl Default for ToolRunnerBuilder {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            max_concurrent_tools: DEFAULT_MAX_CONCURRENT_TOOLS,
        }
    }
}

impl ToolRunnerBuilder {
    pub fn add_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(box_tool(tool));
        self
    }

    /// Add tools boxed with [`crate::box_tools!`]
    pub fn add_tools(mut self, tools: impl IntoIterator<Item = Box<dyn DynTool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_max_concurrent_tools(mut self, max: usize) -> Self {
        self.max_concurrent_tools = max.max(1);
        self
    }

    pub fn build(self) -> ToolRunner {
        let mut runner = ToolRunner {
            tools: Vec::new(),
            hooks: HookRegistry::default(),
            max_concurrent_tools: self.max_concurrent_tools,
        };
        for tool in self.tools {
            runner.push(tool);
        }
        runner
    }
}

/// Executes tool calls, wiring resume markers and event hooks into each call.
///
/// # Example
///
/// ```ignore
/// let runner = ToolRunner::builder()
///     .add_tool(AuthorizedTool::new(CheckCalendar, authorizer, build_request))
///     .build();
///
/// let call = ToolCall::new("call_1", "check_calendar", json!({"day": "2025-01-01"}));
/// match runner.run(&RequestContext::new(user_id), call).await {
///     Ok(result) => println!("{}", result.as_text()),
///     Err(e) if e.is_interrupt() => send_to_client(stream_error_text(&e)),
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub struct ToolRunner {
    tools: Vec<Box<dyn DynTool>>,
    hooks: HookRegistry,
    max_concurrent_tools: usize,
}

impl ToolRunner {
    pub fn builder() -> ToolRunnerBuilder {
        ToolRunnerBuilder::default()
    }

    /// Register a tool after construction
    pub fn add_tool<T: Tool + 'static>(&mut self, tool: T) {
        self.push(box_tool(tool));
    }

    fn push(&mut self, tool: Box<dyn DynTool>) {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            log::warn!(
                "tool '{}' is already registered; calls will reach the first one",
                tool.name()
            );
        }
        self.tools.push(tool);
    }

    /// Add an event hook
    ///
    /// Hooks see the runner's lifecycle events and the authorization events
    /// emitted by wrapped tools.
    pub fn add_hook(&self, hook: impl AuthHook + 'static) -> HookId {
        self.hooks.add(hook)
    }

    /// Remove a hook; returns false if it was not registered
    pub fn remove_hook(&self, id: HookId) -> bool {
        self.hooks.remove(id)
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Run one tool call.
    ///
    /// Interrupts come back as `Err(ToolError::Interrupted(..))` stamped with
    /// `call.id`; hosts hand them to an adapter.
    pub async fn run(
        &self,
        request: &RequestContext,
        call: ToolCall,
    ) -> Result<ToolResult, ToolError> {
        let start = Instant::now();
        let resume = call.prior_result.as_ref().and_then(ResumeMarker::detect);

        self.hooks.emit(&AuthEvent::ToolRequested {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
            resume: resume.is_some(),
        });

        if !call.input.is_object() {
            let type_name = match &call.input {
                Value::Null => "null",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) => "array",
                Value::Object(_) => "object",
            };
            return Err(self.fail(
                &call,
                start,
                ToolError::InvalidInput(format!(
                    "tool input must be a JSON object, got: {}",
                    type_name
                )),
            ));
        }

        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            return Err(self.fail(&call, start, ToolError::NotFound(call.name.clone())));
        };

        let mut ctx = ToolContext::new(request.clone(), call.id.clone()).with_hooks(self.hooks.clone());
        if let Some(marker) = resume {
            log::debug!("resuming tool call {}", call.id);
            ctx = ctx.with_resume(marker);
        }

        self.hooks.emit(&AuthEvent::ToolExecuting {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
        });

        match tool.execute_raw(&ctx, call.input.clone()).await {
            Ok(result) => {
                self.hooks.emit(&AuthEvent::ToolCompleted {
                    tool_call_id: call.id,
                    name: call.name,
                    output: result.clone(),
                    duration: start.elapsed(),
                });
                Ok(result)
            }
            Err(e) => Err(self.fail(&call, start, e)),
        }
    }

    /// Run several independent calls, at most `max_concurrent_tools` at once.
    ///
    /// Results are returned in the order of `calls`, paired with each call id.
    pub async fn run_many(
        &self,
        request: &RequestContext,
        calls: Vec<ToolCall>,
    ) -> Vec<(String, Result<ToolResult, ToolError>)> {
        stream::iter(calls)
            .map(|call| async move {
                let id = call.id.clone();
                (id, self.run(request, call).await)
            })
            .buffered(self.max_concurrent_tools)
            .collect()
            .await
    }

    fn fail(&self, call: &ToolCall, start: Instant, error: ToolError) -> ToolError {
        match error.interrupt() {
            Some(interrupt) => {
                log::debug!("tool call {} interrupted: {}", call.id, interrupt.code());
                self.hooks.emit(&AuthEvent::Interrupted {
                    interrupt: interrupt.clone(),
                });
            }
            None => self.hooks.emit(&AuthEvent::ToolFailed {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                error: error.to_string(),
                duration: start.elapsed(),
            }),
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::AuthorizeError;
    use crate::credential::Credential;
    use crate::interrupt::InterruptKind;
    use crate::request::AuthorizationRequest;
    use crate::store::{AuthStore, MemoryAuthStore};
    use crate::test_utils::{EventCollector, MockAuthorizer, TokenEchoTool};
    use crate::wrapper::AuthorizedTool;
    use serde_json::json;
    use std::sync::Arc;

    fn runner_with(authorizer: Arc<MockAuthorizer>) -> ToolRunner {
        ToolRunner::builder()
            .add_tool(AuthorizedTool::new(
                TokenEchoTool::new("echo"),
                authorizer,
                |_input, ctx| {
                    AuthorizationRequest::builder(ctx.user_id())
                        .scope("read")
                        .build()
                },
            ))
            .build()
    }

    #[tokio::test]
    async fn test_run_emits_lifecycle_events() {
        let runner = runner_with(Arc::new(MockAuthorizer::approving(Credential::new("t"))));
        let collector = EventCollector::new();
        runner.add_hook(collector.clone());

        let result = runner
            .run(
                &RequestContext::new("alice"),
                ToolCall::new("call_1", "echo", json!({"text": "hi"})),
            )
            .await
            .unwrap();

        assert_eq!(result.as_str(), Some("hi:t"));
        let types = collector.event_types();
        assert_eq!(types.first(), Some(&"tool_requested"));
        assert_eq!(types.last(), Some(&"tool_completed"));
        assert!(collector.has_event("authorization_requested"));
        assert!(collector.has_event("state_changed"));
    }

    #[tokio::test]
    async fn test_run_rejects_non_object_input() {
        let runner = runner_with(Arc::new(MockAuthorizer::new()));
        let err = tokio_test::assert_err!(
            runner
                .run(
                    &RequestContext::new("alice"),
                    ToolCall::new("call_1", "echo", json!("hi")),
                )
                .await
        );
        assert!(matches!(err, ToolError::InvalidInput(ref m) if m.contains("string")));
    }

    #[tokio::test]
    async fn test_run_unknown_tool_emits_failure() {
        let runner = runner_with(Arc::new(MockAuthorizer::new()));
        let collector = EventCollector::new();
        runner.add_hook(collector.clone());

        let err = runner
            .run(
                &RequestContext::new("alice"),
                ToolCall::new("call_1", "missing", json!({})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert!(collector.has_event("tool_failed"));
    }

    #[tokio::test]
    async fn test_interrupt_is_reported_not_failed() {
        let authorizer = Arc::new(MockAuthorizer::new());
        authorizer.push_err(AuthorizeError::interrupted(InterruptKind::CibaPending {
            auth_req_id: "abc123".into(),
            interval: 5,
            expires_in: Some(300),
        }));
        let runner = runner_with(authorizer);
        let collector = EventCollector::new();
        runner.add_hook(collector.clone());

        let err = runner
            .run(
                &RequestContext::new("alice"),
                ToolCall::new("call_9", "echo", json!({"text": "x"})),
            )
            .await
            .unwrap_err();

        assert_eq!(err.interrupt().unwrap().tool_call_id(), "call_9");
        assert!(collector.has_event("interrupted"));
        assert!(!collector.has_event("tool_failed"));
    }

    #[tokio::test]
    async fn test_resume_marker_uses_parked_credential() {
        let store = Arc::new(MemoryAuthStore::new());
        store
            .save_credential("call_1", Credential::new("parked"))
            .await
            .unwrap();

        // The authorizer would deny; the parked credential must win
        let authorizer = Arc::new(MockAuthorizer::new());
        let runner = ToolRunner::builder()
            .add_tool(
                AuthorizedTool::new(TokenEchoTool::new("echo"), authorizer.clone(), |_i, ctx| {
                    AuthorizationRequest::builder(ctx.user_id()).build()
                })
                .with_store(store.clone()),
            )
            .build();

        let call = ToolCall::new("call_1", "echo", json!({"text": "again"}))
            .with_prior_result(ResumeMarker::new().to_value());
        let result = runner.run(&RequestContext::new("alice"), call).await.unwrap();

        assert_eq!(result.as_str(), Some("again:parked"));
        assert!(authorizer.requests().is_empty());
        assert!(store.take_credential("call_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_many_preserves_order() {
        let runner = runner_with(Arc::new(MockAuthorizer::approving(Credential::new("t"))));
        let calls = (0..5)
            .map(|i| ToolCall::new(format!("c{}", i), "echo", json!({"text": i.to_string()})))
            .collect();

        let results = runner.run_many(&RequestContext::new("alice"), calls).await;
        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["c0", "c1", "c2", "c3", "c4"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn test_remove_hook() {
        let runner = runner_with(Arc::new(MockAuthorizer::approving(Credential::new("t"))));
        let collector = EventCollector::new();
        let id = runner.add_hook(collector.clone());
        assert!(runner.remove_hook(id));
        assert!(!runner.remove_hook(id));

        runner
            .run(
                &RequestContext::new("alice"),
                ToolCall::new("c", "echo", json!({"text": "x"})),
            )
            .await
            .unwrap();
        assert!(collector.events().is_empty());
    }
}
