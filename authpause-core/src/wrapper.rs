//! Wrapping a tool so it only runs with an authorized credential.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::authorizer::{AuthorizeError, Authorizer, CallContext, FgaGate};
use crate::context::{BoundCredential, ToolContext};
use crate::credential::Credential;
use crate::events::AuthEvent;
use crate::interrupt::InterruptKind;
use crate::request::AuthorizationRequest;
use crate::state::AuthorizationState;
use crate::store::AuthStore;
use crate::tool::{Tool, ToolError, ToolResult};

type RequestBuilder<I> = Box<dyn Fn(&I, &ToolContext) -> AuthorizationRequest + Send + Sync>;
type KeyBuilder<I> = Box<dyn Fn(&I, &ToolContext) -> String + Send + Sync>;

/// A tool that obtains a credential before its body runs.
///
/// Each invocation:
///
/// 1. refuses to start if the context already carries a credential
///    (authorized tools do not nest)
/// 2. runs the optional FGA gate
/// 3. on a resume, consumes a credential parked for this call, if any
/// 4. otherwise builds an [`AuthorizationRequest`] from the input and asks
///    the authorizer for a credential
/// 5. runs the inner tool with the credential bound to a fresh context
///
/// Any interrupt raised along the way carries the invocation's tool call id.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use authpause_auth0::Auth0Client;
/// use authpause_core::{
///     AuthorizationRequest, AuthorizedTool, FederatedConnectionAuthorizer, Tool, ToolContext,
///     ToolError, ToolResult,
/// };
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct CalendarInput { date: String }
///
/// struct CheckCalendar;
///
/// impl Tool for CheckCalendar {
///     type Input = CalendarInput;
///     fn name(&self) -> &str { "check_user_calendar" }
///     fn description(&self) -> &str { "Check availability" }
///     fn execute(
///         &self,
///         ctx: &ToolContext,
///         input: Self::Input,
///     ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send {
///         let token = ctx.access_token().map(str::to_string);
///         async move {
///             let _token = token?;
///             Ok(format!("available on {}", input.date).into())
///         }
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Auth0Client::from_env()?;
/// let authorizer = Arc::new(FederatedConnectionAuthorizer::new(client, "google-oauth2"));
///
/// let tool = AuthorizedTool::new(CheckCalendar, authorizer, |_input, ctx| {
///     AuthorizationRequest::builder(ctx.user_id())
///         .scope("https://www.googleapis.com/auth/calendar.freebusy")
///         .build()
/// });
/// # Ok(())
/// # }
/// ```
pub struct AuthorizedTool<T: Tool> {
    inner: T,
    authorizer: Arc<dyn Authorizer>,
    build_request: RequestBuilder<T::Input>,
    store_key: Option<KeyBuilder<T::Input>>,
    store: Option<Arc<dyn AuthStore>>,
    fga: Option<FgaGate<T::Input>>,
}

impl<T: Tool> AuthorizedTool<T> {
    /// Wrap `inner`, building a fresh request from each call's input
    pub fn new(
        inner: T,
        authorizer: Arc<dyn Authorizer>,
        build_request: impl Fn(&T::Input, &ToolContext) -> AuthorizationRequest
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            inner,
            authorizer,
            build_request: Box::new(build_request),
            store_key: None,
            store: None,
            fga: None,
        }
    }

    /// Key pending state and parked credentials by something other than the
    /// tool call id (e.g. a value derived from the input)
    pub fn with_store_key(
        mut self,
        store_key: impl Fn(&T::Input, &ToolContext) -> String + Send + Sync + 'static,
    ) -> Self {
        self.store_key = Some(Box::new(store_key));
        self
    }

    /// Consume credentials parked in `store` when a call resumes
    pub fn with_store(mut self, store: Arc<dyn AuthStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Check a relationship tuple before anything else
    pub fn with_fga(mut self, gate: FgaGate<T::Input>) -> Self {
        self.fga = Some(gate);
        self
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn key_for(&self, input: &T::Input, ctx: &ToolContext) -> String {
        match &self.store_key {
            Some(build) => build(input, ctx),
            None => ctx.tool_call_id().to_string(),
        }
    }

    async fn obtain_credential(
        &self,
        ctx: &ToolContext,
        input: &T::Input,
        key: &str,
        state: &mut AuthorizationState,
    ) -> Result<(Credential, AuthorizationRequest), AuthorizeError> {
        let request = (self.build_request)(input, ctx);

        if let Some(gate) = &self.fga {
            let tuple = gate.tuple_for(input, ctx.request());
            gate.check(&tuple).await?;
        }

        if ctx.is_resume() {
            if let Some(store) = &self.store {
                if let Some(credential) = store.take_live_credential(key, Utc::now()).await? {
                    log::debug!("using parked credential for {}", ctx.tool_call_id());
                    return Ok((credential, request));
                }
            }
        }

        ctx.emit(AuthEvent::AuthorizationRequested {
            tool_call_id: ctx.tool_call_id().to_string(),
            name: self.inner.name().to_string(),
            scopes: request.scopes(),
        });

        let call = CallContext {
            tool_call_id: ctx.tool_call_id(),
            store_key: key,
            request: ctx.request(),
            resume: ctx.is_resume(),
        };
        let credential = self.authorizer.authorize(&request, &call).await;
        if let Err(AuthorizeError::Interrupted { kind, .. }) = &credential {
            if !kind.is_terminal() {
                advance(ctx, state, AuthorizationState::Pending);
            }
        }
        Ok((credential?, request))
    }
}

/// Move `state` forward and report it
fn advance(ctx: &ToolContext, state: &mut AuthorizationState, to: AuthorizationState) {
    match state.transition(to) {
        Ok(next) => {
            ctx.emit(AuthEvent::StateChanged {
                tool_call_id: ctx.tool_call_id().to_string(),
                from: *state,
                to: next,
            });
            *state = next;
        }
        Err(e) => log::warn!("{} for {}", e, ctx.tool_call_id()),
    }
}

impl<T: Tool> Tool for AuthorizedTool<T> {
    type Input = T::Input;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn input_schema(&self) -> Value {
        self.inner.input_schema()
    }

    fn execute(
        &self,
        ctx: &ToolContext,
        input: Self::Input,
    ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send {
        async move {
            if ctx.is_bound() {
                return Err(ToolError::NestedAuthorization {
                    active: ctx.tool_call_id().to_string(),
                    requested: self.name().to_string(),
                });
            }

            let key = self.key_for(&input, ctx);
            let mut state = AuthorizationState::Idle;
            advance(ctx, &mut state, AuthorizationState::AuthorizationRequested);

            let (credential, request) =
                match self.obtain_credential(ctx, &input, &key, &mut state).await {
                    Ok(obtained) => obtained,
                    Err(err) => {
                        let terminal = match &err {
                            AuthorizeError::Interrupted { kind, .. } => kind.is_terminal(),
                            _ => true,
                        };
                        if terminal {
                            let to = match &err {
                                AuthorizeError::Interrupted {
                                    kind: InterruptKind::AccessDenied { .. },
                                    ..
                                } => AuthorizationState::Denied,
                                _ => AuthorizationState::Failed,
                            };
                            advance(ctx, &mut state, to);
                        }
                        return Err(err.into_tool_error(ctx.tool_call_id()));
                    }
                };

            advance(ctx, &mut state, AuthorizationState::Approved);

            let bound = ctx.bind(
                self.name(),
                BoundCredential {
                    credential,
                    required_scopes: request.scopes(),
                    connection: request.connection().map(str::to_string),
                    deferred_scope_check: self.authorizer.defers_scope_check(),
                },
            )?;

            advance(ctx, &mut state, AuthorizationState::Executing);
            let result = self.inner.execute(&bound, input).await;
            let done = if result.is_ok() {
                AuthorizationState::Completed
            } else {
                AuthorizationState::Failed
            };
            advance(ctx, &mut state, done);
            result
        }
    }
}
