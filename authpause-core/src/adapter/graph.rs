use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::interrupt::Interrupt;
use crate::tool::{ToolError, ToolResult};

/// State key the interrupt payload is written under unless configured
pub const DEFAULT_STATE_KEY: &str = "authInterrupt";

/// A graph-level instruction: merge `update` into shared state, then
/// optionally jump to `goto`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphCommand {
    pub update: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<String>,
}

/// What a graph node should do with a tool outcome
#[derive(Debug, Clone, PartialEq)]
pub enum GraphStep {
    /// The tool produced a result; carry on along the normal edge
    Continue(ToolResult),
    /// The tool was interrupted; apply the command
    Command(GraphCommand),
}

/// Converts tool interrupts into graph commands.
///
/// Pending interrupts route to a retry node so the graph can poll again;
/// all others route to a notification node where the user is told what to
/// do. Without a configured node the command only updates state and leaves
/// routing to the graph's conditional edges.
#[derive(Debug, Clone)]
pub struct GraphAdapter {
    state_key: String,
    pending_node: Option<String>,
    denied_node: Option<String>,
}

impl Default for GraphAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_KEY)
    }
}

impl GraphAdapter {
    pub fn new(state_key: impl Into<String>) -> Self {
        Self {
            state_key: state_key.into(),
            pending_node: None,
            denied_node: None,
        }
    }

    pub fn route_pending_to(mut self, node: impl Into<String>) -> Self {
        self.pending_node = Some(node.into());
        self
    }

    pub fn route_denied_to(mut self, node: impl Into<String>) -> Self {
        self.denied_node = Some(node.into());
        self
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Map a tool outcome to a step. Errors other than interrupts propagate.
    pub fn handle(&self, result: Result<ToolResult, ToolError>) -> Result<GraphStep, ToolError> {
        match result {
            Ok(output) => Ok(GraphStep::Continue(output)),
            Err(err) => match err.into_interrupt() {
                Ok(interrupt) => Ok(GraphStep::Command(self.command_for(&interrupt)?)),
                Err(other) => Err(other),
            },
        }
    }

    pub fn command_for(&self, interrupt: &Interrupt) -> Result<GraphCommand, ToolError> {
        let mut update = Map::new();
        update.insert(self.state_key.clone(), interrupt.to_value()?);

        let goto = if interrupt.is_pending() {
            self.pending_node.clone()
        } else {
            self.denied_node.clone()
        };

        Ok(GraphCommand { update, goto })
    }

    /// Read back an interrupt previously written into `state`
    pub fn interrupt_from_state(&self, state: &Value) -> Option<Interrupt> {
        let value = state.get(&self.state_key)?;
        if value.is_null() {
            return None;
        }
        Interrupt::from_value(value.clone()).ok()
    }

    /// Command that removes the interrupt from state once it is handled
    pub fn clear(&self) -> GraphCommand {
        let mut update = Map::new();
        update.insert(self.state_key.clone(), Value::Null);
        GraphCommand { update, goto: None }
    }
}
