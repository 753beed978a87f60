//! Connection state of the broker session.
//!
//! The kernel publishes a [`ConnectionState`] on a `watch` channel every time
//! the connection changes; observers read the latest value at their own pace.

use std::fmt;

/// Lifecycle of the broker connection.
///
/// `Connecting -> Connected -> Disconnected -> Reconnecting -> Connecting -> ...`
///
/// The reconnect delay carried by `Reconnecting` is always the configured fixed
/// interval; the session never gives up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// CONNECT sent, waiting for CONNACK.
    Connecting,
    /// CONNACK accepted; subscriptions have been (re)issued.
    Connected,
    /// Connection lost. Carries the root-cause message.
    Disconnected(String),
    /// Sleeping before the next attempt, in seconds.
    Reconnecting(f64),
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Reconnecting(_) => "Reconnecting",
        }
    }

    /// Disconnect reason or reconnect delay; empty for the other states.
    pub fn details(&self) -> String {
        match self {
            ConnectionState::Disconnected(reason) => reason.clone(),
            ConnectionState::Reconnecting(seconds) => format!("in {seconds} seconds"),
            _ => String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}
