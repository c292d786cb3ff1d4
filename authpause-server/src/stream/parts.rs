//! Parts written to the tool-call stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One server-sent event in a tool-call stream.
///
/// Serialized with a kebab-case `type` field; payload fields are camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    /// The stream opened.
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },

    /// The tool call's arguments are known.
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },

    /// The tool produced a result.
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable { tool_call_id: String, output: Value },

    /// The call failed. For interrupts `error_text` is the prefixed wire
    /// form; anything else is a generic message.
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },

    /// The stream is complete.
    Finish,
}

#[cfg(test)]
#[path = "parts_tests.rs"]
mod tests;
