//! Broker engine
//!
//! [`BrokerEngine`] is the in-memory state: topics, subscriber lists and the
//! registered clients. Its API is synchronous and meant to sit behind a lock.
//!
//! [`LocalBroker`] puts the engine behind a `Mutex`, stores the connect and
//! subscribe hooks, and implements [`Broker`]. Hooks always run outside the
//! engine lock so a slow hook never stalls fan-out for other connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use super::topic::{SubscriberId, Topic};
use super::{
    Broker, ConnectEvent, ConnectHook, ConnectReply, Disconnect, SequenceInfo, SubscribeEvent,
    SubscribeHook,
};
use crate::auth::Identity;
use crate::client::{Client, ConnectionState, Session};
use crate::transport::message::ServerMessage;
use crate::utils::{BrokerError, GatewayError};

#[derive(Debug, Default)]
pub struct BrokerEngine {
    pub topics: HashMap<String, Topic>,
    pub clients: HashMap<SubscriberId, Client>,
}

impl BrokerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_client(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove_client(&mut self, client_id: &SubscriberId) -> Option<Client> {
        self.clients.remove(client_id)
    }

    /// Subscribe a client to a topic, creating the topic on first use.
    pub fn subscribe(&mut self, topic: &str, subscriber: SubscriberId) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(subscriber);
    }

    /// Remove a subscriber; a topic left without subscribers is dropped.
    pub fn unsubscribe(&mut self, topic: &str, subscriber: &SubscriberId) {
        if let Some(t) = self.topics.get_mut(topic) {
            t.unsubscribe(subscriber);
            if t.subscribers.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    /// Queue `payload` for every subscriber of `channel`.
    ///
    /// JSON payloads are embedded as-is in the publication frame; anything
    /// else is carried as a (lossy) UTF-8 string. A channel only exists while
    /// it has subscribers: publishing to any other name records nothing and
    /// reports offset 0.
    pub fn publish(&mut self, channel: &str, payload: &[u8]) -> SequenceInfo {
        let Some(topic) = self.topics.get_mut(channel) else {
            debug!("Channel '{channel}' has no subscribers");
            return SequenceInfo {
                offset: 0,
                delivered: 0,
            };
        };
        let offset = topic.next_offset();

        let data = serde_json::from_slice(payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
        });
        let frame = ServerMessage::Publication {
            channel: channel.to_string(),
            offset,
            data,
        };

        let mut delivered = 0;
        for sub_id in &topic.subscribers {
            match self.clients.get(sub_id) {
                Some(client) => {
                    if client.send_json(&frame) {
                        delivered += 1;
                    } else {
                        warn!("Failed to send to {sub_id}: receiver closed");
                    }
                }
                None => warn!("No client registered with id: {sub_id}"),
            }
        }

        SequenceInfo { offset, delivered }
    }

    /// Remove a client and all of its subscriptions.
    pub fn cleanup_client(&mut self, client_id: &SubscriberId) -> Option<Client> {
        let client = self.remove_client(client_id);

        self.topics.retain(|name, topic| {
            if topic.subscribers.remove(client_id) {
                debug!("Unsubscribed {client_id} from topic {name}");
            }
            !topic.subscribers.is_empty()
        });

        client
    }
}

#[derive(Default)]
struct Hooks {
    connect: Option<ConnectHook>,
    subscribe: Option<SubscribeHook>,
}

/// In-process broker used by the bundled WebSocket and HTTP transports.
#[derive(Default)]
pub struct LocalBroker {
    engine: Mutex<BrokerEngine>,
    hooks: RwLock<Hooks>,
    closed: AtomicBool,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn engine(&self) -> Result<MutexGuard<'_, BrokerEngine>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable);
        }
        self.engine.lock().map_err(|_| BrokerError::Unavailable)
    }

    fn connect_hook(&self) -> Option<ConnectHook> {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        hooks.connect.clone()
    }

    fn subscribe_hook(&self) -> Option<SubscribeHook> {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        hooks.subscribe.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn register_client(&self, client: Client) -> Result<(), BrokerError> {
        self.engine()?.register_client(client);
        Ok(())
    }

    /// Register a client unless the broker is closed or already holds
    /// `max_connections` clients. The check and the insert share one lock.
    pub fn admit(&self, client: Client, max_connections: usize) -> Result<(), Disconnect> {
        let mut engine = self.engine().map_err(|_| Disconnect::SHUTDOWN)?;
        // shutdown may have run while we waited for the lock
        if self.is_closed() {
            return Err(Disconnect::SHUTDOWN);
        }
        if engine.clients.len() >= max_connections {
            return Err(Disconnect::SERVER_ERROR);
        }
        engine.register_client(client);
        Ok(())
    }

    pub fn client_count(&self) -> usize {
        self.engine().map(|e| e.clients.len()).unwrap_or(0)
    }

    pub fn identity_of(&self, client_id: &str) -> Option<Identity> {
        let engine = self.engine().ok()?;
        engine.clients.get(client_id)?.identity().cloned()
    }

    pub fn subscribers_of(&self, channel: &str) -> usize {
        self.engine()
            .ok()
            .and_then(|e| e.topics.get(channel).map(|t| t.subscribers.len()))
            .unwrap_or(0)
    }

    /// Run the connect hook for a pending client.
    ///
    /// On accept the client becomes `Connected`, receives its `connected`
    /// frame, and is then subscribed to the reply's channels, so that frame
    /// always precedes any publication on those channels.
    pub fn connect(&self, client_id: &str, token: &str) -> Result<ConnectReply, Disconnect> {
        {
            let engine = self.engine().map_err(|_| Disconnect::SHUTDOWN)?;
            match engine.clients.get(client_id) {
                Some(client) if client.is_pending() => {}
                Some(_) => return Err(Disconnect::BAD_REQUEST),
                None => return Err(Disconnect::SERVER_ERROR),
            }
        }

        let Some(hook) = self.connect_hook() else {
            warn!("No connect hook registered; refusing {client_id}");
            return Err(Disconnect::SERVER_ERROR);
        };
        let outcome = hook(ConnectEvent { client_id, token });

        let mut engine = self.engine().map_err(|_| Disconnect::SHUTDOWN)?;
        let Some(client) = engine.clients.get_mut(client_id) else {
            return Err(Disconnect::SERVER_ERROR);
        };

        match outcome {
            Ok(reply) => {
                client.state = ConnectionState::Connected(Session::new(reply.identity.clone()));
                client.send_json(&ServerMessage::Connected {
                    client: client_id.to_string(),
                    data: reply.data.clone(),
                    subscriptions: reply.subscriptions.clone(),
                });
                for channel in &reply.subscriptions {
                    engine.subscribe(channel, client_id.to_string());
                }
                Ok(reply)
            }
            Err(disconnect) => {
                client.state = ConnectionState::Rejected(disconnect);
                Err(disconnect)
            }
        }
    }

    /// Subscribe a connected client after the subscribe hook approves.
    ///
    /// Without a registered hook every request is denied.
    pub fn subscribe(&self, client_id: &str, channel: &str) -> Result<(), GatewayError> {
        let identity = {
            let engine = self.engine()?;
            engine
                .clients
                .get(client_id)
                .and_then(|c| c.identity().cloned())
                .ok_or(GatewayError::Unauthenticated)?
        };

        let Some(hook) = self.subscribe_hook() else {
            return Err(GatewayError::Unauthorized {
                channel: channel.to_string(),
            });
        };
        hook(SubscribeEvent {
            client_id,
            identity: &identity,
            channel,
        })?;

        let mut engine = self.engine()?;
        if !engine.clients.contains_key(client_id) {
            return Err(GatewayError::Unauthenticated);
        }
        engine.subscribe(channel, client_id.to_string());
        Ok(())
    }

    pub fn unsubscribe(&self, client_id: &str, channel: &str) {
        if let Ok(mut engine) = self.engine() {
            engine.unsubscribe(channel, &client_id.to_string());
        }
    }

    /// Drop a client and its subscriptions, logging who left.
    pub fn disconnect(&self, client_id: &str) {
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(client) = engine.cleanup_client(&client_id.to_string()) else {
            return;
        };

        match client.identity() {
            Some(identity) => info!(
                client_id,
                user_id = %identity.user_id,
                username = %identity.username,
                "client disconnected"
            ),
            None => debug!(client_id, "unauthenticated client disconnected"),
        }
    }

    /// Refuse further work and close every client.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        for client in engine.clients.values() {
            client.send_json(&ServerMessage::disconnect(Disconnect::SHUTDOWN));
            let _ = client.sender.send(close_frame(Disconnect::SHUTDOWN));
        }
        let count = engine.clients.len();
        engine.clients.clear();
        engine.topics.clear();

        info!("Broker shut down, closed {count} client(s)");
    }
}

impl Broker for LocalBroker {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<SequenceInfo, BrokerError> {
        Ok(self.engine()?.publish(channel, payload))
    }

    fn on_connect(&self, hook: ConnectHook) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        hooks.connect = Some(hook);
    }

    fn on_subscribe_attempt(&self, hook: SubscribeHook) {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        hooks.subscribe = Some(hook);
    }
}

/// WebSocket close frame carrying a disconnect code.
pub fn close_frame(disconnect: Disconnect) -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: CloseCode::from(disconnect.code),
        reason: disconnect.reason.into(),
    }))
}
