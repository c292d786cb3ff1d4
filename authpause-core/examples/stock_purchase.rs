// Example demonstrating a CIBA-protected tool
//
// The first call sends a push approval to the user's device and comes back
// with an AUTHORIZATION_PENDING interrupt. The loop then re-sends the call
// with a resume marker, the way a client would after showing a spinner,
// until the user approves or denies.
//
// Requires AUTH0_DOMAIN, AUTH0_CLIENT_ID, AUTH0_CLIENT_SECRET and a user id:
//
// Run with: AUTHPAUSE_USER_ID='auth0|...' cargo run --example stock_purchase

use std::sync::Arc;
use std::time::Duration;

use authpause_core::adapter::stream_error_text;
use authpause_core::auth0::Auth0Client;
use authpause_core::{
    AuthEvent, AuthorizationRequest, AuthorizedTool, CibaAuthorizer, MemoryAuthStore,
    RequestContext, ResumeMarker, Tool, ToolCall, ToolContext, ToolError, ToolResult, ToolRunner,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema)]
struct BuyInput {
    /// Ticker symbol
    ticker: String,
    /// Number of shares
    qty: u32,
}

struct BuyStock;

impl Tool for BuyStock {
    type Input = BuyInput;

    fn name(&self) -> &str {
        "buy_stock"
    }

    fn description(&self) -> &str {
        "Buy shares of a stock on the user's behalf"
    }

    fn execute(
        &self,
        ctx: &ToolContext,
        input: Self::Input,
    ) -> impl std::future::Future<Output = Result<ToolResult, ToolError>> + Send {
        let token = ctx.access_token().map(str::to_string);
        async move {
            let token = token?;
            // A real tool would call the brokerage API with `token` here
            Ok(format!(
                "Bought {} {} (token ends in {})",
                input.qty,
                input.ticker,
                &token[token.len().saturating_sub(4)..]
            )
            .into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let user_id = std::env::var("AUTHPAUSE_USER_ID")?;
    let store = Arc::new(MemoryAuthStore::new());
    let authorizer = Arc::new(CibaAuthorizer::new(Auth0Client::from_env()?, store));

    let runner = ToolRunner::builder()
        .add_tool(AuthorizedTool::new(BuyStock, authorizer, |input, ctx| {
            AuthorizationRequest::builder(ctx.user_id())
                .scope("openid")
                .scope("stock:trade")
                .binding_message(format!("Buy {} {}", input.qty, input.ticker))
                .build()
        }))
        .build();

    runner.add_hook(|event: &AuthEvent| {
        if let AuthEvent::StateChanged { from, to, .. } = event {
            println!("  [{} -> {}]", from, to);
        }
    });

    let request = RequestContext::new(user_id);
    let mut call = ToolCall::new("call_1", "buy_stock", json!({"ticker": "ZEKO", "qty": 10}));

    loop {
        match runner.run(&request, call.clone()).await {
            Ok(result) => {
                println!("{}", result.as_text());
                return Ok(());
            }
            Err(e) => {
                println!("{}", stream_error_text(&e));
                match e.interrupt() {
                    Some(interrupt) if interrupt.is_pending() => {
                        let wait = interrupt.kind().interval().unwrap_or(5);
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        call = call.with_prior_result(ResumeMarker::new().to_value());
                    }
                    _ => return Ok(()),
                }
            }
        }
    }
}
