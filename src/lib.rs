//! # pubgate
//!
//! `pubgate` is the authentication and authorization front of a real-time
//! messaging service. Clients present an HMAC-signed token when they open a
//! WebSocket, are subscribed to channels the policy allows, and publish
//! messages that the in-process broker fans out to every subscriber.
//!
//! ## Core Modules
//!
//! - `auth`: token issue and validation, and the `Identity` a token carries.
//! - `gateway`: connection gate, channel authorizer and publish pipeline.
//! - `broker`: the `Broker` capability and its in-memory implementation.
//! - `client`: a connected socket and its connection state.
//! - `config`: layered configuration (defaults, file, environment).
//! - `transport`: the WebSocket server and the HTTP API.
//! - `utils`: error types and logging setup.

pub mod auth;
pub mod broker;
pub mod client;
pub mod config;
pub mod gateway;
pub mod transport;
pub mod utils;
