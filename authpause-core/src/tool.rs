use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authorizer::AuthorizeError;
use crate::context::ToolContext;
use crate::interrupt::Interrupt;

/// Result types that tools can return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolResult {
    /// Plain text response
    Text(String),

    /// Structured JSON data
    Json(Value),
}

impl ToolResult {
    /// Create a JSON result from any serializable type
    pub fn json<T: Serialize>(value: T) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Create a text result from a string
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Get the text content, or the JSON rendered as a string
    pub fn as_text(&self) -> String {
        match self {
            ToolResult::Text(s) => s.clone(),
            ToolResult::Json(v) => v.to_string(),
        }
    }

    /// Get a reference to the text content if this is a Text variant
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ToolResult::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The result as a JSON value, as sent to clients
    pub fn to_value(&self) -> Value {
        match self {
            ToolResult::Text(s) => Value::String(s.clone()),
            ToolResult::Json(v) => v.clone(),
        }
    }
}

impl From<String> for ToolResult {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolResult {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Errors that can occur during tool execution
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The call needs user authorization before it can produce a result
    #[error("{0}")]
    Interrupted(Box<Interrupt>),

    /// An authorized tool was invoked while another one's credential is bound
    #[error("cannot nest authorized tool '{requested}' inside authorized call '{active}'")]
    NestedAuthorization { active: String, requested: String },

    /// The tool asked for a credential outside an authorized wrapper
    #[error("no credential is bound to tool call '{0}'")]
    MissingCredential(String),

    /// The authorization server, FGA, or store failed outside the
    /// interrupt protocol
    #[error("authorization failed: {0}")]
    Authorization(#[source] Box<AuthorizeError>),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

impl ToolError {
    /// The interrupt carried by this error, if any
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            ToolError::Interrupted(interrupt) => Some(interrupt),
            _ => None,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, ToolError::Interrupted(_))
    }

    /// Take the interrupt out of this error
    pub fn into_interrupt(self) -> Result<Interrupt, ToolError> {
        match self {
            ToolError::Interrupted(interrupt) => Ok(*interrupt),
            other => Err(other),
        }
    }
}

impl From<Interrupt> for ToolError {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupted(Box::new(interrupt))
    }
}

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        Self::Custom(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        Self::Custom(s.to_string())
    }
}

/// Trait for implementing tools that may need user authorization.
///
/// Tools define an input type with `#[derive(Deserialize, JsonSchema)]` and
/// receive a [`ToolContext`] describing the call. Plain tools ignore the
/// context; tools wrapped in [`crate::AuthorizedTool`] read their credential
/// from it.
///
/// # Example
///
/// ```rust
/// use authpause_core::{Tool, ToolContext, ToolError, ToolResult};
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct CheckCalendarInput {
///     /// ISO 8601 date
///     date: String,
/// }
///
/// struct CheckCalendar;
///
/// impl Tool for CheckCalendar {
///     type Input = CheckCalendarInput;
///
///     fn name(&self) -> &str { "check_user_calendar" }
///     fn description(&self) -> &str { "Check whether the user is free on a date" }
///
///     fn execute(
///         &self,
///         ctx: &ToolContext,
///         input: Self::Input,
///     ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send {
///         let token = ctx.access_token().map(str::to_string);
///         async move {
///             let _token = token?;
///             Ok(format!("free on {}", input.date).into())
///         }
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The input type for this tool. Must implement `Deserialize` and `JsonSchema`.
    type Input: DeserializeOwned + JsonSchema + Send + Sync;

    /// The name of the tool (e.g., "check_user_calendar")
    fn name(&self) -> &str;

    /// A description of what the tool does
    fn description(&self) -> &str;

    /// Execute the tool with typed input
    fn execute(
        &self,
        ctx: &ToolContext,
        input: Self::Input,
    ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send;

    /// Get the JSON schema for this tool's input.
    fn input_schema(&self) -> Value {
        let schema = schemars::schema_for!(Self::Input);
        serde_json::to_value(schema).unwrap_or(Value::Null)
    }
}

/// Object-safe trait for dynamic tool dispatch.
///
/// Implement [`Tool`] instead and use [`box_tool`] to convert.
pub trait DynTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn execute_raw<'a>(
        &'a self,
        ctx: &'a ToolContext,
        input: Value,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'a>,
    >;
}

/// Convert a `Tool` into a type-erased `Box<dyn DynTool>` for storage in collections.
pub fn box_tool<T: Tool + 'static>(tool: T) -> Box<dyn DynTool> {
    Box::new(ToolWrapper(tool))
}

/// Create a `Vec<Box<dyn DynTool>>` from heterogeneous tool types.
#[macro_export]
macro_rules! box_tools {
    ($($tool:expr),* $(,)?) => {
        vec![$($crate::tool::box_tool($tool)),*]
    };
}

struct ToolWrapper<T>(T);

impl<T: Tool + 'static> DynTool for ToolWrapper<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn input_schema(&self) -> Value {
        self.0.input_schema()
    }

    fn execute_raw<'a>(
        &'a self,
        ctx: &'a ToolContext,
        input: Value,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ToolResult, ToolError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let typed_input: T::Input = serde_json::from_value(input)
                .map_err(|e| ToolError::InvalidInput(format!("Failed to deserialize input: {}", e)))?;

            self.0.execute(ctx, typed_input).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::interrupt::InterruptKind;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct AddInput {
        a: i64,
        b: i64,
    }

    struct AddTool;

    impl Tool for AddTool {
        type Input = AddInput;

        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Add two numbers"
        }

        fn execute(
            &self,
            _ctx: &ToolContext,
            input: Self::Input,
        ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send {
            async move { ToolResult::json(json!({"sum": input.a + input.b})).map_err(Into::into) }
        }
    }

    #[tokio::test]
    async fn test_box_tool_executes_with_json_input() {
        let tool = box_tool(AddTool);
        let ctx = ToolContext::new(RequestContext::new("u"), "call_1");

        let result = tool.execute_raw(&ctx, json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(result, ToolResult::Json(json!({"sum": 5})));
        assert_eq!(tool.name(), "add");
    }

    #[tokio::test]
    async fn test_box_tool_rejects_bad_input() {
        let tool = box_tool(AddTool);
        let ctx = ToolContext::new(RequestContext::new("u"), "call_1");

        let err = tool.execute_raw(&ctx, json!({"a": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn test_input_schema_lists_properties() {
        let schema = AddTool.input_schema();
        assert!(schema["properties"]["a"].is_object());
        assert!(schema["properties"]["b"].is_object());
    }

    #[test]
    fn test_box_tools_macro() {
        let tools: Vec<Box<dyn DynTool>> = box_tools![AddTool, AddTool];
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn test_tool_result_conversions() {
        assert_eq!(ToolResult::from("hi").as_str(), Some("hi"));
        assert_eq!(ToolResult::text("hi").to_value(), json!("hi"));
        assert_eq!(ToolResult::Json(json!({"k": 1})).as_text(), r#"{"k":1}"#);
    }

    #[test]
    fn test_interrupt_error_round_trip() {
        let interrupt = Interrupt::new(
            "c",
            InterruptKind::AccessDenied {
                reason: "declined".into(),
            },
        );
        let err: ToolError = interrupt.clone().into();
        assert!(err.is_interrupt());
        assert_eq!(err.interrupt(), Some(&interrupt));
        assert_eq!(err.to_string(), interrupt.message());
        assert_eq!(err.into_interrupt().unwrap(), interrupt);

        let other = ToolError::from("boom");
        assert!(other.interrupt().is_none());
        assert!(other.into_interrupt().is_err());
    }
}
