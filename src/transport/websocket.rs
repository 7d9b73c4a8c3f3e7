//! WebSocket transport
//!
//! Accepts connections, registers a `Client` for each with the broker and
//! translates JSON frames into gateway operations. Responsibilities:
//! - Enforce connect-first: the first frame must be `connect`, and a failed
//!   connect ends the connection with a `disconnect` frame and a close frame
//! - Refuse connections beyond the configured limit, and close sockets that
//!   do not complete `connect` within the configured timeout
//! - Forward broker output to the socket from a dedicated send loop
//! - Run broker cleanup exactly once, whichever side ends first

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{Instant, timeout_at};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Disconnect, LocalBroker, close_frame};
use crate::client::Client;
use crate::config::BrokerSettings;
use crate::gateway::Gateway;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::GatewayError;

/// What the read loop should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Close,
}

/// Per-connection limits applied by the accept loop.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_connections: usize,
    /// How long a socket may stay open without a successful `connect`.
    pub connect_timeout: Duration,
}

impl From<&BrokerSettings> for ConnectionLimits {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            max_connections: settings.max_connections,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
        }
    }
}

pub async fn start_websocket_server(
    addr: &str,
    broker: Arc<LocalBroker>,
    gateway: Arc<Gateway>,
    limits: ConnectionLimits,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{addr}");

    serve(listener, broker, gateway, limits).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    broker: Arc<LocalBroker>,
    gateway: Arc<Gateway>,
    limits: ConnectionLimits,
) {
    while let Ok((stream, peer)) = listener.accept().await {
        let broker = broker.clone();
        let gateway = gateway.clone();
        spawn(handle_connection(stream, peer, broker, gateway, limits));
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broker: Arc<LocalBroker>,
    gateway: Arc<Gateway>,
    limits: ConnectionLimits,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error from {peer}: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let client = Client::new(tx.clone());
    let client_id = client.id.clone();
    if let Err(disconnect) = broker.admit(client, limits.max_connections) {
        warn!("Refusing connection from {peer}: {disconnect}");
        if let Some(frame) = ServerMessage::disconnect(disconnect).to_ws() {
            let _ = ws_sender.send(frame).await;
        }
        let _ = ws_sender.send(close_frame(disconnect)).await;
        return;
    }
    debug!(client_id, %peer, "client registered");

    let cleanup_called = Arc::new(AtomicBool::new(false));

    let do_cleanup = {
        let broker = broker.clone();
        let client_id = client_id.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                broker.disconnect(&client_id);
            }
        }
    };

    {
        let client_id = client_id.clone();
        let do_cleanup = do_cleanup.clone();

        spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = msg.is_close();
                if let Err(e) = ws_sender.send(msg).await {
                    warn!("Failed to send message to {client_id}: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }

            do_cleanup();
            debug!("Send loop closed for {client_id}");
        });
    }

    let connect_deadline = Instant::now() + limits.connect_timeout;
    loop {
        let next = if broker.identity_of(&client_id).is_some() {
            ws_receiver.next().await
        } else {
            match timeout_at(connect_deadline, ws_receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(client_id, %peer, "no connect within {:?}", limits.connect_timeout);
                    close_with(&tx, Disconnect::BAD_REQUEST);
                    break;
                }
            }
        };
        let Some(Ok(msg)) = next else {
            break;
        };

        match msg {
            WsMessage::Text(text) => {
                let flow =
                    handle_client_message(&broker, &gateway, &client_id, &tx, text.as_str());
                if flow == Flow::Close {
                    break;
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    do_cleanup();
}

/// Apply one client frame. Replies are queued on `tx`.
pub(crate) fn handle_client_message(
    broker: &LocalBroker,
    gateway: &Gateway,
    client_id: &str,
    tx: &UnboundedSender<WsMessage>,
    text: &str,
) -> Flow {
    let parsed = serde_json::from_str::<ClientMessage>(text);
    let identity = broker.identity_of(client_id);

    let (message, identity) = match (parsed, identity) {
        (Ok(ClientMessage::Connect { token }), None) => {
            return match broker.connect(client_id, &token) {
                Ok(_) => Flow::Continue,
                Err(disconnect) => close_with(tx, disconnect),
            };
        }
        (Ok(ClientMessage::Connect { .. }), Some(_)) => {
            reply(
                tx,
                &ServerMessage::error(&GatewayError::BadRequest("already connected".to_string())),
            );
            return Flow::Continue;
        }
        (Err(err), Some(_)) => {
            warn!(
                "Invalid client message from {client_id}: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
            reply(
                tx,
                &ServerMessage::error(&GatewayError::BadRequest("malformed frame".to_string())),
            );
            return Flow::Continue;
        }
        (_, None) => {
            warn!("Client {client_id} sent a frame before connecting");
            return close_with(tx, Disconnect::BAD_REQUEST);
        }
        (Ok(message), Some(identity)) => (message, identity),
    };

    match message {
        ClientMessage::Subscribe { channel } => match broker.subscribe(client_id, &channel) {
            Ok(()) => {
                debug!("{client_id} subscribed to {channel}");
                reply(tx, &ServerMessage::Subscribed { channel });
            }
            Err(e) => reply(tx, &ServerMessage::error(&e)),
        },
        ClientMessage::Unsubscribe { channel } => {
            if gateway.authorize_unsubscribe(&identity, &channel) {
                broker.unsubscribe(client_id, &channel);
                reply(tx, &ServerMessage::Unsubscribed { channel });
            } else {
                reply(tx, &ServerMessage::error(&GatewayError::Unauthorized { channel }));
            }
        }
        ClientMessage::Publish { channel, content } => {
            match gateway.publish(Some(&identity), &channel, &content) {
                Ok(message) => reply(tx, &ServerMessage::Published { message }),
                Err(e) => reply(tx, &ServerMessage::error(&e)),
            }
        }
        ClientMessage::Connect { .. } => {}
    }
    Flow::Continue
}

fn reply(tx: &UnboundedSender<WsMessage>, msg: &ServerMessage) {
    if let Some(frame) = msg.to_ws() {
        let _ = tx.send(frame);
    }
}

/// Queue a `disconnect` frame followed by the matching close frame.
fn close_with(tx: &UnboundedSender<WsMessage>, disconnect: Disconnect) -> Flow {
    reply(tx, &ServerMessage::disconnect(disconnect));
    let _ = tx.send(close_frame(disconnect));
    Flow::Close
}
