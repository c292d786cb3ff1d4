//! Integration tests for authpause-server.
//!
//! These tests verify the full request→runner→parts→SSE flow.

use std::sync::Arc;

use authpause_core::test_utils::{MockAuthorizer, TokenEchoTool};
use authpause_core::{
    AuthStore, AuthorizationRequest, AuthorizeError, AuthorizedTool, Credential, Interrupt,
    InterruptKind, MemoryAuthStore, ToolRunner,
};
use authpause_server::AuthpauseRouter;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with(authorizer: Arc<MockAuthorizer>, store: Arc<MemoryAuthStore>) -> Router {
    let runner = ToolRunner::builder()
        .add_tool(
            AuthorizedTool::new(TokenEchoTool::new("echo"), authorizer, |_input, ctx| {
                AuthorizationRequest::builder(ctx.user_id())
                    .scope("read")
                    .build()
            })
            .with_store(store),
        )
        .build();

    AuthpauseRouter::new(runner)
        .with_stream("/api/tools")
        .build()
        .unwrap()
}

fn stream_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/tools")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn echo_call(text: &str) -> Value {
    json!({
        "toolCallId": "call_1",
        "toolName": "echo",
        "args": {"text": text},
        "userId": "auth0|alice"
    })
}

/// Collect SSE data payloads from a response body.
async fn collect_parts(body: Body) -> Vec<Value> {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

fn part_types(parts: &[Value]) -> Vec<&str> {
    parts.iter().filter_map(|p| p["type"].as_str()).collect()
}

// ============================================================================
// Stream Tests
// ============================================================================

#[tokio::test]
async fn test_successful_call_streams_output() {
    let authorizer = Arc::new(MockAuthorizer::approving(Credential::new("tok")));
    let app = app_with(authorizer, Arc::new(MemoryAuthStore::new()));

    let response = tokio_test::assert_ok!(app.oneshot(stream_request(echo_call("hi"))).await);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let parts = collect_parts(response.into_body()).await;
    assert_eq!(
        part_types(&parts),
        [
            "start",
            "tool-input-available",
            "tool-output-available",
            "finish"
        ]
    );
    assert_eq!(parts[1]["toolCallId"], "call_1");
    assert_eq!(parts[1]["input"]["text"], "hi");
    assert_eq!(parts[2]["output"], "hi:tok");
}

#[tokio::test]
async fn test_interrupt_is_sent_on_error_part() {
    let authorizer = Arc::new(MockAuthorizer::new());
    authorizer.push_err(AuthorizeError::interrupted(InterruptKind::CibaPending {
        auth_req_id: "abc123".into(),
        interval: 5,
        expires_in: Some(300),
    }));
    let app = app_with(authorizer, Arc::new(MemoryAuthStore::new()));

    let response = app.oneshot(stream_request(echo_call("hi"))).await.unwrap();
    let parts = collect_parts(response.into_body()).await;
    assert_eq!(
        part_types(&parts),
        ["start", "tool-input-available", "error", "finish"]
    );

    let error_text = parts[2]["errorText"].as_str().unwrap();
    let interrupt = Interrupt::from_wire(error_text).unwrap();
    assert_eq!(interrupt.code(), "AUTHORIZATION_PENDING");
    assert_eq!(interrupt.tool_call_id(), "call_1");
}

#[tokio::test]
async fn test_other_failures_are_generic() {
    let authorizer = Arc::new(MockAuthorizer::approving(Credential::new("tok")));
    let app = app_with(authorizer, Arc::new(MemoryAuthStore::new()));

    // `text` has the wrong type; the details stay in the server log
    let body = json!({
        "toolCallId": "call_1",
        "toolName": "echo",
        "args": {"text": 42},
        "userId": "auth0|alice"
    });
    let response = app.oneshot(stream_request(body)).await.unwrap();
    let parts = collect_parts(response.into_body()).await;

    assert_eq!(parts[2]["type"], "error");
    assert_eq!(parts[2]["errorText"], "An error occurred.");
}

#[tokio::test]
async fn test_resume_uses_parked_credential() {
    let store = Arc::new(MemoryAuthStore::new());
    store
        .save_credential("call_1", Credential::new("parked"))
        .await
        .unwrap();
    let authorizer = Arc::new(MockAuthorizer::new());
    let app = app_with(authorizer.clone(), store);

    let mut body = echo_call("again");
    body["priorResult"] = json!({"continueInterruption": true});
    let response = app.oneshot(stream_request(body)).await.unwrap();
    let parts = collect_parts(response.into_body()).await;

    assert_eq!(parts[2]["type"], "tool-output-available");
    assert_eq!(parts[2]["output"], "again:parked");
    assert!(authorizer.requests().is_empty());
}

// ============================================================================
// Request Validation Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_tool_returns_not_found() {
    let app = app_with(
        Arc::new(MockAuthorizer::new()),
        Arc::new(MemoryAuthStore::new()),
    );

    let mut body = echo_call("hi");
    body["toolName"] = json!("missing");
    let response = app.oneshot(stream_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_user_id_is_rejected() {
    let app = app_with(
        Arc::new(MockAuthorizer::new()),
        Arc::new(MemoryAuthStore::new()),
    );

    let mut body = echo_call("hi");
    body["userId"] = json!("");
    let response = app.oneshot(stream_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_request_body_returns_error() {
    let app = app_with(
        Arc::new(MockAuthorizer::new()),
        Arc::new(MemoryAuthStore::new()),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/api/tools")
        .header("Content-Type", "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_nested_router_path() {
    let runner = ToolRunner::builder()
        .add_tool(AuthorizedTool::new(
            TokenEchoTool::new("echo"),
            Arc::new(MockAuthorizer::approving(Credential::new("tok"))),
            |_input, ctx| AuthorizationRequest::builder(ctx.user_id()).build(),
        ))
        .build();
    let app = AuthpauseRouter::new(runner)
        .with_stream("/tools")
        .build_nested("/agent")
        .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/agent/tools")
        .header("Content-Type", "application/json")
        .body(Body::from(echo_call("hi").to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
