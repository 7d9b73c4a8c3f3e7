//! Session credentials.
//!
//! [`TokenService`] issues and validates the signed bearer strings clients
//! present when they connect or call the HTTP API. A validated credential
//! yields an [`Identity`].

pub mod identity;
pub mod token;

pub use identity::Identity;
pub use token::{Credential, TokenService, strip_bearer};
