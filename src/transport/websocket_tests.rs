use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::broker::LocalBroker;
use crate::config::Settings;
use crate::gateway::Gateway;
use crate::transport::message::ServerMessage;
use crate::transport::websocket::{ConnectionLimits, serve};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn setup_server(max_connections: usize) -> (String, Arc<LocalBroker>, Arc<Gateway>) {
    setup_server_with(ConnectionLimits {
        max_connections,
        connect_timeout: Duration::from_secs(10),
    })
    .await
}

async fn setup_server_with(limits: ConnectionLimits) -> (String, Arc<LocalBroker>, Arc<Gateway>) {
    let mut settings = Settings::default();
    settings.auth.secret = "ws-test-secret".to_string();

    let broker = Arc::new(LocalBroker::new());
    let gateway = Arc::new(Gateway::from_settings(&settings, broker.clone()));
    gateway.install(broker.as_ref());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(listener, broker.clone(), gateway.clone(), limits));

    (addr, broker, gateway)
}

async fn open(addr: &str) -> Socket {
    let (ws_stream, _) = tokio_tungstenite::connect_async(addr)
        .await
        .expect("WebSocket handshake failed");
    ws_stream
}

async fn send(ws: &mut Socket, frame: serde_json::Value) {
    ws.send(WsMessage::text(frame.to_string()))
        .await
        .expect("Failed to send frame");
}

async fn next_raw(ws: &mut Socket) -> WsMessage {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("Timed out waiting for a frame")
        .expect("Stream ended")
        .expect("Read error")
}

async fn next_frame(ws: &mut Socket) -> ServerMessage {
    let raw = next_raw(ws).await;
    serde_json::from_str(raw.to_text().unwrap())
        .unwrap_or_else(|e| panic!("Failed to deserialize ServerMessage from '{raw:?}': {e}"))
}

async fn connected(addr: &str, gateway: &Gateway, user: &str) -> Socket {
    let mut ws = open(addr).await;
    let token = gateway.issue_token(user, user).unwrap().to_string();
    send(&mut ws, json!({"type": "connect", "token": token})).await;
    match next_frame(&mut ws).await {
        ServerMessage::Connected { data, .. } => assert_eq!(data["username"], user),
        other => panic!("Expected connected, got {other:?}"),
    }
    ws
}

#[tokio::test]
async fn test_connect_success() {
    let (addr, broker, gateway) = setup_server(10).await;
    let _ws = connected(&addr, &gateway, "alice").await;
    assert_eq!(broker.client_count(), 1);
}

#[tokio::test]
async fn test_invalid_token_is_disconnected() {
    let (addr, broker, _gateway) = setup_server(10).await;
    let mut ws = open(&addr).await;

    send(&mut ws, json!({"type": "connect", "token": "invalid-token"})).await;

    match next_frame(&mut ws).await {
        ServerMessage::Disconnect { code, .. } => assert_eq!(code, 3500),
        other => panic!("Expected disconnect, got {other:?}"),
    }
    match next_raw(&mut ws).await {
        WsMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 3500),
        other => panic!("Expected close frame, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.client_count(), 0);
}

#[tokio::test]
async fn test_action_before_connect_fails() {
    let (addr, _broker, _gateway) = setup_server(10).await;
    let mut ws = open(&addr).await;

    send(&mut ws, json!({"type": "subscribe", "channel": "chat:general"})).await;

    match next_frame(&mut ws).await {
        ServerMessage::Disconnect { code, .. } => assert_eq!(code, 3501),
        other => panic!("Expected disconnect, got {other:?}"),
    }
    assert!(next_raw(&mut ws).await.is_close());
}

#[tokio::test]
async fn test_publish_fans_out_to_subscribers() {
    let (addr, _broker, gateway) = setup_server(10).await;
    let mut alice = connected(&addr, &gateway, "alice").await;
    let mut bob = connected(&addr, &gateway, "bob").await;

    send(&mut bob, json!({"type": "subscribe", "channel": "chat:general"})).await;
    assert!(matches!(
        next_frame(&mut bob).await,
        ServerMessage::Subscribed { .. }
    ));

    send(
        &mut alice,
        json!({"type": "publish", "channel": "chat:general", "content": "hi"}),
    )
    .await;
    match next_frame(&mut alice).await {
        ServerMessage::Published { message } => assert_eq!(message.username, "alice"),
        other => panic!("Expected published, got {other:?}"),
    }

    match next_frame(&mut bob).await {
        ServerMessage::Publication { channel, data, .. } => {
            assert_eq!(channel, "chat:general");
            assert_eq!(data["content"], "hi");
            assert_eq!(data["username"], "alice");
        }
        other => panic!("Expected publication, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_cleans_up_subscriptions() {
    let (addr, broker, gateway) = setup_server(10).await;
    let mut ws = connected(&addr, &gateway, "alice").await;
    send(&mut ws, json!({"type": "subscribe", "channel": "chat:general"})).await;
    let _subscribed = next_frame(&mut ws).await;
    assert_eq!(broker.subscribers_of("chat:general"), 1);

    ws.close(None).await.unwrap();
    drop(ws);

    for _ in 0..50 {
        if broker.client_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(broker.client_count(), 0);
    assert_eq!(broker.subscribers_of("chat:general"), 0);
}

#[tokio::test]
async fn test_connection_limit() {
    let (addr, _broker, gateway) = setup_server(1).await;
    let _first = connected(&addr, &gateway, "alice").await;

    let mut second = open(&addr).await;
    match next_frame(&mut second).await {
        ServerMessage::Disconnect { code, .. } => assert_eq!(code, 3004),
        other => panic!("Expected disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_disconnects_clients() {
    let (addr, broker, gateway) = setup_server(10).await;
    let mut ws = connected(&addr, &gateway, "alice").await;

    broker.shutdown();

    match next_frame(&mut ws).await {
        ServerMessage::Disconnect { code, .. } => assert_eq!(code, 3001),
        other => panic!("Expected disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_socket_is_closed_after_connect_timeout() {
    let (addr, broker, gateway) = setup_server_with(ConnectionLimits {
        max_connections: 1,
        connect_timeout: Duration::from_millis(200),
    })
    .await;

    let mut idle = open(&addr).await;
    match next_frame(&mut idle).await {
        ServerMessage::Disconnect { code, .. } => assert_eq!(code, 3501),
        other => panic!("Expected disconnect, got {other:?}"),
    }
    assert!(next_raw(&mut idle).await.is_close());

    // the slot held by the idle socket is free again
    for _ in 0..50 {
        if broker.client_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(broker.client_count(), 0);
    let _ws = connected(&addr, &gateway, "alice").await;
}

#[tokio::test]
async fn test_connected_socket_outlives_connect_timeout() {
    let (addr, _broker, gateway) = setup_server_with(ConnectionLimits {
        max_connections: 10,
        connect_timeout: Duration::from_millis(100),
    })
    .await;
    let mut ws = connected(&addr, &gateway, "alice").await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    send(&mut ws, json!({"type": "subscribe", "channel": "chat:general"})).await;
    assert!(matches!(
        next_frame(&mut ws).await,
        ServerMessage::Subscribed { .. }
    ));
}
