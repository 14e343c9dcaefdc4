use std::time::Duration;

use mom_reqrep::{ConnectionBuilder, MemoryHub, Message, MessagingError, Result};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    #[cfg(feature = "logging")]
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let hub = MemoryHub::new();
    let server = ConnectionBuilder::new().hub(&hub, "echo-server").open().await?;
    let client = ConnectionBuilder::new().hub(&hub, "echo-client").open().await?;

    let responder = server
        .responder("echo.req", |request: Message| match request.get("body") {
            Some(body) => Message::from_value(json!({ "body": body })),
            None => Err(MessagingError::Handler("request without body".into())),
        })
        .await?;

    let requestor = client.requestor("echo.req", "echo.res").await?;

    let response = requestor
        .request_with_timeout(
            Message::from_value(json!({ "body": "ping" }))?,
            Duration::from_secs(1),
        )
        .await?;

    println!("echo: {}", response.get("body").unwrap_or(&json!(null)));

    requestor.close().await?;
    responder.close().await?;
    client.close().await?;
    server.close().await?;
    Ok(())
}
