use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use crate::interrupt::Interrupt;
use crate::state::AuthorizationState;
use crate::tool::ToolResult;

/// Events emitted while tool calls are authorized and executed
///
/// These let hosts log, trace, or forward progress to a UI.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    // ===== Tool Lifecycle =====
    /// A tool call was received (fires once per invocation, resumes included)
    ToolRequested {
        tool_call_id: String,
        name: String,
        input: Value,
        /// True when the invocation carried a resume marker
        resume: bool,
    },

    /// The tool body is about to run
    ToolExecuting { tool_call_id: String, name: String },

    /// The tool produced a result
    ToolCompleted {
        tool_call_id: String,
        name: String,
        output: ToolResult,
        duration: Duration,
    },

    /// The tool failed with something other than an interrupt
    ToolFailed {
        tool_call_id: String,
        name: String,
        error: String,
        duration: Duration,
    },

    // ===== Authorization =====
    /// An authorizer is being asked for a credential
    AuthorizationRequested {
        tool_call_id: String,
        name: String,
        scopes: Vec<String>,
    },

    /// The call moved through its authorization lifecycle
    StateChanged {
        tool_call_id: String,
        from: AuthorizationState,
        to: AuthorizationState,
    },

    /// The call raised an interrupt instead of a result
    Interrupted { interrupt: Interrupt },
}

impl AuthEvent {
    /// The tool call this event belongs to
    pub fn tool_call_id(&self) -> &str {
        match self {
            AuthEvent::ToolRequested { tool_call_id, .. }
            | AuthEvent::ToolExecuting { tool_call_id, .. }
            | AuthEvent::ToolCompleted { tool_call_id, .. }
            | AuthEvent::ToolFailed { tool_call_id, .. }
            | AuthEvent::AuthorizationRequested { tool_call_id, .. }
            | AuthEvent::StateChanged { tool_call_id, .. } => tool_call_id,
            AuthEvent::Interrupted { interrupt } => interrupt.tool_call_id(),
        }
    }
}

/// Hook for observing authorization events
///
/// # Example
/// ```
/// use authpause_core::events::{AuthEvent, AuthHook};
///
/// struct Logger;
///
/// impl AuthHook for Logger {
///     fn on_event(&self, event: &AuthEvent) {
///         if let AuthEvent::Interrupted { interrupt } = event {
///             println!("{} interrupted: {}", interrupt.tool_call_id(), interrupt.code());
///         }
///     }
/// }
/// ```
pub trait AuthHook: Send + Sync {
    /// Called when an event occurs
    fn on_event(&self, event: &AuthEvent);
}

/// Blanket implementation for closures
impl<F> AuthHook for F
where
    F: Fn(&AuthEvent) + Send + Sync,
{
    fn on_event(&self, event: &AuthEvent) {
        self(event)
    }
}

/// Unique identifier for a registered hook.
///
/// Used to remove hooks via [`crate::ToolRunner::remove_hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub(crate) u64);

/// Shared list of hooks
#[derive(Clone, Default)]
pub(crate) struct HookRegistry {
    hooks: Arc<RwLock<Vec<(HookId, Arc<dyn AuthHook>)>>>,
    next_id: Arc<AtomicU64>,
}

impl HookRegistry {
    pub fn add(&self, hook: impl AuthHook + 'static) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, Arc::new(hook)));
        id
    }

    pub fn remove(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    pub fn emit(&self, event: &AuthEvent) {
        // Snapshot so a hook can add or remove hooks without deadlocking
        let hooks: Vec<Arc<dyn AuthHook>> =
            self.hooks.read().iter().map(|(_, h)| h.clone()).collect();
        for hook in hooks {
            hook.on_event(event);
        }
    }
}
