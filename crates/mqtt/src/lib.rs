//! # relaybee-mqtt: the broker session behind relaybee
//!
//! A thin layer over `rumqttc` that keeps one MQTT connection alive for the
//! lifetime of the agent:
//!
//! - **Fixed-interval reconnect**: every connection error is followed by the
//!   same delay (3 s by default) and another attempt, with no attempt limit.
//! - **Resubscribe on connect**: sessions are clean, so every CONNACK re-issues
//!   the configured filters at QoS 1.
//! - **Single event stream**: connects, disconnects and incoming messages are
//!   delivered in order over one `mpsc` channel as [`SessionEvent`]s.
//! - **State watch**: the latest [`ConnectionState`] is available on a `watch`
//!   channel.
//!
//! ```ignore
//! let config = Config::from_url("mqtt://broker:1883", "device-AB123")?;
//! let (session, mut events) = MqttSession::start(&config, vec!["device/AB123/#".into()])?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Message(msg) => println!("{}: {} bytes", msg.topic, msg.payload.len()),
//!         other => println!("{:?}", other),
//!     }
//! }
//! session.shutdown().await?;
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod session;
pub mod state;

pub use config::{BrokerUrl, Config};
pub use error::TransferError;
pub use event::{IncomingMessage, SessionEvent};
pub use session::MqttSession;
pub use state::ConnectionState;
