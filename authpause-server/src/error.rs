//! Error types for the authpause server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Errors that can occur when building a router.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No endpoints were configured.
    #[error("No endpoints configured. Call .with_stream() before .build()")]
    NoEndpoints,
}

/// Errors returned before a stream is opened.
///
/// Once streaming has started, failures travel on the stream's `error` part
/// instead.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// No tool with this name is registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::ToolNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(e) => {
                log::error!("internal server error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
