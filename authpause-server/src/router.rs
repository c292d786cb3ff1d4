//! Router builder for authpause HTTP endpoints.

use std::sync::Arc;

use authpause_core::ToolRunner;
use axum::routing::post;
use axum::Router;

use crate::error::BuildError;
use crate::state::AppState;
use crate::stream::handler::stream_handler;

/// Builder for configuring authpause HTTP endpoints.
///
/// # Example
///
/// ```rust,no_run
/// use authpause_server::AuthpauseRouter;
/// use authpause_core::ToolRunner;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runner = ToolRunner::builder().build();
/// let app = AuthpauseRouter::new(runner)
///     .with_stream("/api/tools")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct AuthpauseRouter {
    runner: Arc<ToolRunner>,
    stream_path: Option<String>,
}

impl AuthpauseRouter {
    /// Create a new router builder with the given runner.
    pub fn new(runner: ToolRunner) -> Self {
        Self::from_arc(Arc::new(runner))
    }

    /// Create a new router builder from an existing `Arc<ToolRunner>`.
    ///
    /// Use this when the runner is shared, e.g. with hooks registered elsewhere.
    pub fn from_arc(runner: Arc<ToolRunner>) -> Self {
        Self {
            runner,
            stream_path: None,
        }
    }

    /// Serve the tool-call stream endpoint at `path`.
    pub fn with_stream(mut self, path: impl Into<String>) -> Self {
        self.stream_path = Some(path.into());
        self
    }

    /// Build the router with all configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoEndpoints`] if no endpoints were configured.
    pub fn build(self) -> Result<Router, BuildError> {
        let Some(stream_path) = self.stream_path else {
            return Err(BuildError::NoEndpoints);
        };

        let state = AppState::from_arc(self.runner);
        Ok(Router::new()
            .route(&stream_path, post(stream_handler))
            .with_state(state))
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoEndpoints`] if no endpoints were configured.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use authpause_server::AuthpauseRouter;
    /// # use authpause_core::ToolRunner;
    /// # use axum::Router;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Stream endpoint at /agent/tools
    /// let tools = AuthpauseRouter::new(ToolRunner::builder().build())
    ///     .with_stream("/tools")
    ///     .build_nested("/agent")?;
    ///
    /// let app = Router::new().merge(tools);
    /// # Ok(())
    /// # }
    /// ```
    pub fn build_nested(self, prefix: impl Into<String>) -> Result<Router, BuildError> {
        Ok(Router::new().nest(&prefix.into(), self.build()?))
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
