use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Disconnect, LocalBroker};
use crate::client::Client;
use crate::config::Settings;
use crate::gateway::Gateway;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::websocket::{Flow, handle_client_message};

struct Harness {
    broker: Arc<LocalBroker>,
    gateway: Arc<Gateway>,
    client_id: String,
    tx: UnboundedSender<WsMessage>,
    rx: UnboundedReceiver<WsMessage>,
}

impl Harness {
    fn new() -> Self {
        let mut settings = Settings::default();
        settings.auth.secret = "transport-secret".to_string();
        settings.gateway.owner_namespace = Some("user".to_string());

        let broker = Arc::new(LocalBroker::new());
        let gateway = Arc::new(Gateway::from_settings(&settings, broker.clone()));
        gateway.install(broker.as_ref());

        let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
        let client = Client::new(tx.clone());
        let client_id = client.id.clone();
        broker.register_client(client).unwrap();

        Self {
            broker,
            gateway,
            client_id,
            tx,
            rx,
        }
    }

    fn send(&self, frame: serde_json::Value) -> Flow {
        self.send_text(&frame.to_string())
    }

    fn send_text(&self, text: &str) -> Flow {
        handle_client_message(&self.broker, &self.gateway, &self.client_id, &self.tx, text)
    }

    fn next(&mut self) -> ServerMessage {
        let msg = self.rx.try_recv().unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    fn connect(&mut self) {
        let token = self.gateway.issue_token("u1", "alice").unwrap().to_string();
        assert_eq!(self.send(json!({"type": "connect", "token": token})), Flow::Continue);
        assert!(matches!(self.next(), ServerMessage::Connected { .. }));
    }
}

#[test]
fn test_parse_client_frames() {
    let connect: ClientMessage = serde_json::from_str(r#"{"type":"connect","token":"t"}"#).unwrap();
    assert!(matches!(connect, ClientMessage::Connect { token } if token == "t"));

    // a connect without a token parses and is rejected later
    let bare: ClientMessage = serde_json::from_str(r#"{"type":"connect"}"#).unwrap();
    assert!(matches!(bare, ClientMessage::Connect { token } if token.is_empty()));

    let publish: ClientMessage =
        serde_json::from_str(r#"{"type":"publish","channel":"chat:general","content":"hi"}"#)
            .unwrap();
    assert!(matches!(publish, ClientMessage::Publish { .. }));

    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"login"}"#).is_err());
}

#[test]
fn test_disconnect_frame_shape() {
    let value = serde_json::to_value(ServerMessage::disconnect(Disconnect::INVALID_TOKEN)).unwrap();
    assert_eq!(
        value,
        json!({"type": "disconnect", "code": 3500, "reason": "invalid token"})
    );
}

#[test]
fn test_connect_then_subscribe() {
    let mut h = Harness::new();
    h.connect();

    assert_eq!(
        h.send(json!({"type": "subscribe", "channel": "chat:general"})),
        Flow::Continue
    );
    match h.next() {
        ServerMessage::Subscribed { channel } => assert_eq!(channel, "chat:general"),
        other => panic!("Expected subscribed, got {other:?}"),
    }
    assert_eq!(h.broker.subscribers_of("chat:general"), 1);
}

#[test]
fn test_invalid_token_closes_with_code() {
    let mut h = Harness::new();

    let flow = h.send(json!({"type": "connect", "token": "invalid-token"}));
    assert_eq!(flow, Flow::Close);
    match h.next() {
        ServerMessage::Disconnect { code, reason } => {
            assert_eq!(code, 3500);
            assert_eq!(reason, "invalid token");
        }
        other => panic!("Expected disconnect, got {other:?}"),
    }
    match h.rx.try_recv().unwrap() {
        WsMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 3500),
        other => panic!("Expected close frame, got {other:?}"),
    }
}

#[test]
fn test_frame_before_connect_is_bad_request() {
    let mut h = Harness::new();

    let flow = h.send(json!({"type": "subscribe", "channel": "chat:general"}));
    assert_eq!(flow, Flow::Close);
    assert!(matches!(
        h.next(),
        ServerMessage::Disconnect { code: 3501, .. }
    ));
    assert_eq!(h.broker.subscribers_of("chat:general"), 0);
}

#[test]
fn test_garbage_before_connect_is_bad_request() {
    let mut h = Harness::new();
    assert_eq!(h.send_text("not json"), Flow::Close);
    assert!(matches!(
        h.next(),
        ServerMessage::Disconnect { code: 3501, .. }
    ));
}

#[test]
fn test_garbage_after_connect_is_an_error_frame() {
    let mut h = Harness::new();
    h.connect();

    assert_eq!(h.send_text("{\"type\":\"nope\"}"), Flow::Continue);
    assert!(matches!(h.next(), ServerMessage::Error { code, .. } if code == "bad_request"));
}

#[test]
fn test_second_connect_is_an_error_frame() {
    let mut h = Harness::new();
    h.connect();

    assert_eq!(
        h.send(json!({"type": "connect", "token": "whatever"})),
        Flow::Continue
    );
    assert!(matches!(h.next(), ServerMessage::Error { code, .. } if code == "bad_request"));
}

#[test]
fn test_denied_subscribe_is_an_error_frame() {
    let mut h = Harness::new();
    h.connect();

    h.send(json!({"type": "subscribe", "channel": "user:u2"}));
    assert!(matches!(h.next(), ServerMessage::Error { code, .. } if code == "unauthorized"));
    assert_eq!(h.broker.subscribers_of("user:u2"), 0);

    h.send(json!({"type": "subscribe", "channel": "user:u1"}));
    assert!(matches!(h.next(), ServerMessage::Subscribed { .. }));
}

#[test]
fn test_publish_acknowledged_and_delivered() {
    let mut h = Harness::new();
    h.connect();
    h.send(json!({"type": "subscribe", "channel": "chat:general"}));
    let _subscribed = h.next();

    h.send(json!({"type": "publish", "channel": "chat:general", "content": "hi"}));

    // fan-out happens inside the publish call, before the acknowledgement
    match h.next() {
        ServerMessage::Publication { channel, offset, data } => {
            assert_eq!(channel, "chat:general");
            assert_eq!(offset, 1);
            assert_eq!(data["content"], "hi");
            assert_eq!(data["username"], "alice");
        }
        other => panic!("Expected publication, got {other:?}"),
    }
    match h.next() {
        ServerMessage::Published { message } => {
            assert_eq!(message.content, "hi");
            assert_eq!(message.username, "alice");
        }
        other => panic!("Expected published, got {other:?}"),
    }
}

#[test]
fn test_publish_empty_content_is_rejected() {
    let mut h = Harness::new();
    h.connect();

    h.send(json!({"type": "publish", "channel": "chat:general", "content": "  "}));
    assert!(matches!(h.next(), ServerMessage::Error { code, .. } if code == "bad_request"));
}

#[test]
fn test_unsubscribe_always_acknowledged() {
    let mut h = Harness::new();
    h.connect();

    h.send(json!({"type": "unsubscribe", "channel": "never-joined"}));
    assert!(matches!(h.next(), ServerMessage::Unsubscribed { channel } if channel == "never-joined"));
}

#[test]
fn test_unsubscribe_from_owned_channel_of_another_user() {
    let mut h = Harness::new();
    h.connect();

    // subscribing is refused under the owner policy, leaving is not
    h.send(json!({"type": "unsubscribe", "channel": "user:u2"}));
    assert!(matches!(h.next(), ServerMessage::Unsubscribed { channel } if channel == "user:u2"));
}
