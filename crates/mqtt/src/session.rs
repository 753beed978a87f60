//! Owning handle for a running broker session.

use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{
    client::ClientBuilder, config::Config, connection::ConnectionKernel, error::TransferError,
    event::SessionEvent, state::ConnectionState,
};

/// Capacity of the channel between the kernel and the application.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A spawned connection kernel plus the handles needed to observe and stop it.
pub struct MqttSession {
    client_id: String,
    state_rx: watch::Receiver<ConnectionState>,
    cancel_token: CancellationToken,
    kernel: JoinHandle<()>,
}

impl MqttSession {
    /// Builds the client, spawns the connection kernel and returns the session
    /// together with the receiving end of its event channel.
    ///
    /// `subscriptions` are issued at QoS 1 after every successful connect.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ConfigError`] if `config` fails validation and
    /// [`TransferError::ClientSetup`] if TLS files cannot be read.
    pub fn start(
        config: &Config,
        subscriptions: Vec<String>,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), TransferError> {
        let builder = ClientBuilder::from_config(config)?;
        let client_id = builder.client_id();
        let (client, event_loop) = builder.build();

        info!(
            "Connecting to {}://{}:{} as '{}'",
            if config.tls.is_some() { "mqtts" } else { "mqtt" },
            config.host,
            config.port,
            client_id
        );

        let cancel_token = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut kernel = ConnectionKernel::new(
            client,
            event_loop,
            subscriptions,
            Duration::from_secs(config.reconnect_interval),
            events_tx,
            cancel_token.clone(),
        );
        let state_rx = kernel.subscribe_state();
        let kernel = tokio::spawn(async move { kernel.run().await });

        Ok((
            Self {
                client_id,
                state_rx,
                cancel_token,
                kernel,
            },
            events_rx,
        ))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Latest connection state, updated by the kernel.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Token that stops the kernel when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Sends DISCONNECT and waits for the kernel task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ConnectionKernel`] if the kernel task panicked.
    pub async fn shutdown(self) -> Result<(), TransferError> {
        self.cancel_token.cancel();
        self.kernel.await.map_err(|e| {
            error!("Connection kernel task failed: {}", e);
            TransferError::ConnectionKernel(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };
        assert!(MqttSession::start(&config, vec![]).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_kernel() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 1,
            client_id: "device-AB123".into(),
            ..Default::default()
        };
        let (session, _events) = MqttSession::start(&config, vec!["device/AB123/#".into()]).unwrap();
        assert_eq!(session.client_id(), "device-AB123");
        assert!(!session.state_receiver().borrow().is_connected());

        tokio::time::timeout(Duration::from_secs(5), session.shutdown())
            .await
            .expect("shutdown timed out")
            .unwrap();
    }
}
