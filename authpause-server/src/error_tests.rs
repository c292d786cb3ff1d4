//! Tests for error handling and IntoResponse implementation.

use crate::error::*;
use axum::{http::StatusCode, response::IntoResponse};

#[test]
fn test_status_code_correctness() {
    let test_cases = [
        (
            ServerError::ToolNotFound("buy_stock".to_string()),
            StatusCode::NOT_FOUND,
        ),
        (
            ServerError::InvalidRequest("".to_string()),
            StatusCode::BAD_REQUEST,
        ),
        (
            ServerError::Internal("".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (error, expected_status) in test_cases {
        let response = error.into_response();
        let (parts, _body) = response.into_parts();
        assert_eq!(parts.status, expected_status);
    }
}

#[test]
fn test_server_error_display() {
    let cases = [
        (
            ServerError::ToolNotFound("buy_stock".to_string()),
            "Tool not found: buy_stock",
        ),
        (
            ServerError::InvalidRequest("bad".to_string()),
            "Invalid request: bad",
        ),
        (
            ServerError::Internal("oops".to_string()),
            "Internal error: oops",
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(error.to_string(), expected);
    }
}

#[tokio::test]
async fn test_error_body_is_json() {
    let response = ServerError::InvalidRequest(r#"Field "userId" is empty"#.to_string())
        .into_response();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["code"], 400);
    assert_eq!(body["error"], r#"Invalid request: Field "userId" is empty"#);
}

#[test]
fn test_build_error_mentions_fix() {
    assert!(BuildError::NoEndpoints.to_string().contains("with_stream"));
}

#[test]
fn test_error_types_are_send_sync() {
    fn is_send<T: Send>() {}
    fn is_sync<T: Sync>() {}

    is_send::<ServerError>();
    is_sync::<ServerError>();
}
