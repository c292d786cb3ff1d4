//! HTTP streaming host for authpause tool calls.
//!
//! Exposes a [`ToolRunner`](authpause_core::ToolRunner) over a single POST
//! endpoint that streams the call's progress as server-sent events.
//! Authorization interrupts are delivered on the `error` part as
//! `AUTH0_AI_INTERRUPTION:{json}`; the client resolves them and re-sends
//! the call with `priorResult: {"continueInterruption": true}`.
//!
//! # Example
//!
//! ```rust,no_run
//! use authpause_server::AuthpauseRouter;
//! use authpause_core::ToolRunner;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = ToolRunner::builder().build();
//!
//! let app = AuthpauseRouter::new(runner)
//!     .with_stream("/api/tools")
//!     .build()?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod router;
pub(crate) mod state;
pub mod stream;

pub use error::{BuildError, ServerError, ServerResult};
pub use router::AuthpauseRouter;
pub use stream::handler::ToolCallRequest;
pub use stream::StreamPart;
