//! Error type for the broker session.
//!
//! Only construction-time errors (bad URL, invalid settings) are surfaced to
//! callers as failures. Runtime connection errors are reported through
//! [`SessionEvent::Disconnected`](crate::SessionEvent::Disconnected) and retried
//! by the kernel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The broker URL could not be understood.
    ///
    /// Accepted forms are `mqtt://host[:port]`, `tcp://host[:port]`,
    /// `mqtts://host[:port]` and `host[:port]`.
    #[error("Invalid broker URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Session settings failed validation.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The client could not be set up, typically because a TLS certificate
    /// or key could not be read.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// The kernel task ended abnormally.
    #[error("Connection kernel error: {0}")]
    ConnectionKernel(String),
}
