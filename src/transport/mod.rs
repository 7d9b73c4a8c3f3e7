//! The `transport` module handles network communication with clients.
//!
//! - `websocket`: the persistent connection protocol (connect, subscribe,
//!   unsubscribe, publish) on top of tokio-tungstenite.
//! - `http`: the login, user-info and publish endpoints used by browser
//!   front-ends, on axum.
//! - `message`: the JSON frames exchanged over the WebSocket.

pub mod http;
pub mod message;
pub mod websocket;

pub use http::{AppState, build_router, start_http_server};
pub use message::{ClientMessage, ServerMessage};
pub use websocket::{ConnectionLimits, start_websocket_server};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod websocket_tests;
