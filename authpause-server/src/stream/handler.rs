//! HTTP handler for the tool-call stream endpoint.

use std::convert::Infallible;

use authpause_core::adapter::{stream_error_text, GENERIC_ERROR_MESSAGE};
use authpause_core::{RequestContext, ToolCall};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::parts::StreamPart;
use crate::error::ServerError;
use crate::state::AppState;

/// Request body for running one tool call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Tool arguments; an empty object when omitted.
    #[serde(default = "empty_args")]
    pub args: Value,
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Refresh token for federated connection exchanges.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// The result stored for this call by an interrupted attempt. Carries
    /// `continueInterruption: true` when the client is resuming.
    #[serde(default)]
    pub prior_result: Option<Value>,
}

fn empty_args() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolCallRequest {
    fn request_context(&self) -> RequestContext {
        let mut context = RequestContext::new(&self.user_id);
        if let Some(thread_id) = &self.thread_id {
            context = context.with_thread_id(thread_id);
        }
        if let Some(refresh_token) = &self.refresh_token {
            context = context.with_refresh_token(refresh_token);
        }
        context
    }

    fn tool_call(&self) -> ToolCall {
        let call = ToolCall::new(&self.tool_call_id, &self.tool_name, self.args.clone());
        match &self.prior_result {
            Some(prior) => call.with_prior_result(prior.clone()),
            None => call,
        }
    }
}

/// Run a tool call and stream its parts.
///
/// Accepts POST with a [`ToolCallRequest`] body and returns an SSE stream:
/// `start`, `tool-input-available`, then `tool-output-available` or
/// `error`, and finally `finish`.
pub async fn stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ToolCallRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    if request.tool_call_id.is_empty() {
        return Err(ServerError::InvalidRequest(
            "toolCallId must not be empty".to_string(),
        ));
    }
    if request.user_id.is_empty() {
        return Err(ServerError::InvalidRequest(
            "userId must not be empty".to_string(),
        ));
    }
    if !state.runner.has_tool(&request.tool_name) {
        return Err(ServerError::ToolNotFound(request.tool_name));
    }

    let runner = state.runner.clone();
    let (tx, rx) = mpsc::channel::<StreamPart>(16);

    tokio::spawn(async move {
        let _ = tx
            .send(StreamPart::Start {
                message_id: uuid::Uuid::new_v4().to_string(),
            })
            .await;
        let _ = tx
            .send(StreamPart::ToolInputAvailable {
                tool_call_id: request.tool_call_id.clone(),
                tool_name: request.tool_name.clone(),
                input: request.args.clone(),
            })
            .await;

        let part = match runner
            .run(&request.request_context(), request.tool_call())
            .await
        {
            Ok(result) => StreamPart::ToolOutputAvailable {
                tool_call_id: request.tool_call_id.clone(),
                output: result.to_value(),
            },
            Err(e) => StreamPart::Error {
                error_text: stream_error_text(&e),
            },
        };

        let _ = tx.send(part).await;
        let _ = tx.send(StreamPart::Finish).await;
    });

    let stream = ReceiverStream::new(rx).map(|part| {
        let json = serde_json::to_string(&part).unwrap_or_else(|e| {
            log::error!("failed to serialize stream part: {}", e);
            serde_json::json!({
                "type": "error",
                "errorText": GENERIC_ERROR_MESSAGE,
            })
            .to_string()
        });
        Ok::<_, Infallible>(Event::default().data(json))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
