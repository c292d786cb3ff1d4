//! Streaming server with a federated-connection tool.
//!
//! Run with:
//! ```sh
//! AUTH0_DOMAIN=... AUTH0_CLIENT_ID=... AUTH0_CLIENT_SECRET=... \
//!   cargo run -p authpause-server --example stream_server
//! ```
//!
//! Test with curl (no refresh token, so expect a FEDERATED_CONNECTION_ERROR
//! interrupt on the error part):
//! ```sh
//! curl -X POST http://localhost:3000/api/tools \
//!   -H "Content-Type: application/json" \
//!   -d '{"toolCallId":"call_1","toolName":"check_calendar","args":{"date":"2025-01-01"},"userId":"auth0|alice"}' \
//!   -N
//! ```

use std::sync::Arc;

use authpause_core::auth0::Auth0Client;
use authpause_core::{
    AuthorizationRequest, AuthorizedTool, FederatedConnectionAuthorizer, Tool, ToolContext,
    ToolError, ToolResult, ToolRunner,
};
use authpause_server::AuthpauseRouter;
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
struct CalendarInput {
    /// Day to check, YYYY-MM-DD
    date: String,
}

struct CheckCalendar;

impl Tool for CheckCalendar {
    type Input = CalendarInput;

    fn name(&self) -> &str {
        "check_calendar"
    }

    fn description(&self) -> &str {
        "Check whether the user is free on a given day"
    }

    fn execute(
        &self,
        ctx: &ToolContext,
        input: Self::Input,
    ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send {
        let token = ctx.access_token().map(|_| ());
        async move {
            token?;
            // A real tool would query the Google Calendar freebusy API here
            Ok(format!("You are free on {}", input.date).into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let authorizer = Arc::new(FederatedConnectionAuthorizer::new(
        Auth0Client::from_env()?,
        "google-oauth2",
    ));

    let runner = ToolRunner::builder()
        .add_tool(AuthorizedTool::new(CheckCalendar, authorizer, |_input, ctx| {
            AuthorizationRequest::builder(ctx.user_id())
                .scope("https://www.googleapis.com/auth/calendar.freebusy")
                .build()
        }))
        .build();

    let app = AuthpauseRouter::new(runner)
        .with_stream("/api/tools")
        .build()?;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    println!("Server running at http://localhost:3000");
    println!("Tool stream endpoint: POST http://localhost:3000/api/tools");

    axum::serve(listener, app).await?;

    Ok(())
}
