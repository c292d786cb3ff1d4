//! # authpause
//!
//! Pause AI agent tool calls until the user authorizes them, then resume the
//! same call with the new credential.
//!
//! A tool that needs a credential is wrapped in an [`AuthorizedTool`]. When
//! the credential cannot be obtained yet, the call fails with an
//! [`Interrupt`] instead of a result. The host sends the interrupt to the
//! client, the client collects the authorization (connect an account, enter a
//! device code, approve a push notification) and re-sends the call with a
//! [`ResumeMarker`]. The wrapper then finishes the authorization and runs the
//! tool body.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use authpause_core::{
//!     AuthorizationRequest, AuthorizedTool, CibaAuthorizer, MemoryAuthStore, RequestContext,
//!     ToolCall, ToolRunner,
//! };
//! use authpause_core::adapter::stream_error_text;
//!
//! let store = Arc::new(MemoryAuthStore::new());
//! let authorizer = Arc::new(CibaAuthorizer::new(Auth0Client::from_env()?, store));
//!
//! let runner = ToolRunner::builder()
//!     .add_tool(AuthorizedTool::new(BuyStock, authorizer, |input, ctx| {
//!         AuthorizationRequest::builder(ctx.user_id())
//!             .scope("stock:trade")
//!             .binding_message(format!("Buy {} {}", input.qty, input.ticker))
//!             .build()
//!     }))
//!     .build();
//!
//! let call = ToolCall::new("call_1", "buy_stock", json!({"ticker": "ZEKO", "qty": 10}));
//! match runner.run(&RequestContext::new(user_id), call).await {
//!     Ok(result) => println!("{}", result.as_text()),
//!     // AUTH0_AI_INTERRUPTION:{"code":"AUTHORIZATION_PENDING",...}
//!     Err(e) => println!("{}", stream_error_text(&e)),
//! }
//! ```
//!
//! ## Authorizers
//!
//! - [`FederatedConnectionAuthorizer`]: exchange the user's refresh token for
//!   an upstream (Google, GitHub, ...) access token
//! - [`CibaAuthorizer`]: push an approval request to the user's device and poll
//! - [`DeviceFlowAuthorizer`]: show a user code to enter at a verification URI
//!
//! An [`FgaGate`] can be attached to a wrapped tool to check a relationship
//! tuple before any authorizer runs.
//!
//! ## Hosts
//!
//! - Streaming responses: [`adapter::stream_error_text`]
//! - Graph runtimes: [`adapter::GraphAdapter`] and the polling [`Resumer`]

pub mod adapter;
pub mod authorizer;
pub mod context;
pub mod credential;
pub mod error;
pub mod events;
pub mod interrupt;
pub mod request;
pub mod resumer;
pub mod runner;
pub mod state;
pub mod store;
pub mod tool;
pub mod wrapper;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use authorizer::{
    AuthorizationPoller, AuthorizeError, Authorizer, CallContext, CibaAuthorizer,
    DeviceCodeCallback, DeviceFlowAuthorizer, FederatedConnectionAuthorizer, FgaGate, FlowMode,
    PendingPoller, PollOutcome, ScopeCheck,
};
pub use context::{RequestContext, ResumeMarker, ToolContext};
pub use credential::{missing_scopes, scope_union, Credential};
pub use error::{Error, Result};
pub use events::{AuthEvent, AuthHook, HookId};
pub use interrupt::{Interrupt, InterruptKind, ResumeHint, WireError, INTERRUPT_PREFIX};
pub use request::{AuthorizationRequest, AuthorizationRequestBuilder};
pub use resumer::{
    InterruptedThread, ResumeValue, Resumer, ThreadFilter, ThreadOutcome, ThreadStore,
    ThreadStoreError, TickReport,
};
pub use runner::{ToolCall, ToolInfo, ToolRunner, ToolRunnerBuilder, DEFAULT_MAX_CONCURRENT_TOOLS};
pub use state::{AuthorizationState, InvalidTransition};
pub use store::{AuthStore, AuthStoreError, FileAuthStore, MemoryAuthStore, PendingAuthorization, PendingFlow};
pub use tool::{box_tool, DynTool, Tool, ToolError, ToolResult};
pub use wrapper::AuthorizedTool;

/// Re-exported so hosts can build clients without a direct dependency
pub use authpause_auth0 as auth0;
