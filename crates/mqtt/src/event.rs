//! Events the session hands to its consumer.

use bytes::Bytes;

/// A PUBLISH received on one of the session's subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// What the broker session surfaces to the application.
///
/// Connection changes are delivered in the same channel as messages so the
/// consumer sees them in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// CONNACK accepted and subscriptions re-issued.
    Connected,
    /// A message arrived.
    Message(IncomingMessage),
    /// The connection dropped; a reconnect is already scheduled.
    Disconnected(String),
}
