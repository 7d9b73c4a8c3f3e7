//! Connects to a running `pubgate server`, subscribes to a channel and
//! publishes one message.
//!
//! ```text
//! TOKEN=$(cargo run -- issue-token --user-id u1 --username alice)
//! cargo run --example simple_client -- "$TOKEN"
//! ```

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let token = std::env::args()
        .nth(1)
        .ok_or("usage: simple_client <token> [ws-url]")?;
    let url = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());

    let (mut ws_stream, _response) = connect_async(url.as_str()).await?;

    // 1. Connect
    let connect = json!({ "type": "connect", "token": token });
    ws_stream.send(WsMessage::text(connect.to_string())).await?;
    if let Some(Ok(WsMessage::Text(reply))) = ws_stream.next().await {
        println!("Connect reply: {reply}");
    }

    // 2. Subscribe
    let subscribe = json!({ "type": "subscribe", "channel": "chat:general" });
    ws_stream.send(WsMessage::text(subscribe.to_string())).await?;

    // 3. Publish
    let publish = json!({
        "type": "publish",
        "channel": "chat:general",
        "content": "Hello from simple_client",
    });
    ws_stream.send(WsMessage::text(publish.to_string())).await?;

    // subscribed, publication, published
    for _ in 0..3 {
        match ws_stream.next().await {
            Some(Ok(WsMessage::Text(incoming))) => println!("Incoming: {incoming}"),
            Some(Ok(WsMessage::Close(frame))) => {
                println!("Closed: {frame:?}");
                break;
            }
            _ => break,
        }
    }

    ws_stream.close(None).await?;
    Ok(())
}
