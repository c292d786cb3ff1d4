//! Application state for the authpause server.

use std::sync::Arc;

use authpause_core::ToolRunner;

/// Shared application state containing the tool runner.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ToolRunner>,
}

impl AppState {
    pub fn from_arc(runner: Arc<ToolRunner>) -> Self {
        Self { runner }
    }
}
