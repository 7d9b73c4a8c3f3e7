//! The `utils` module provides definitions shared across the `pubgate`
//! application: the error types every layer reports through, and the
//! tracing setup used by the binary and the tests.

pub mod error;
pub mod logging;

pub use error::{BrokerError, GatewayError};

#[cfg(test)]
mod tests;
