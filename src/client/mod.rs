//! The `client` module defines the representation of a connected client.
//!
//! A [`Client`] holds the sending half of its outbound channel and the
//! connection state machine: `Pending → {Connected | Rejected}`. Only a
//! `Connected` client carries a [`Session`], and with it an identity.

pub mod pubsub_client;
pub mod session;

pub use pubsub_client::{Client, ConnectionState};
pub use session::Session;
