//! Construction of the rumqttc client and event loop.

use std::{fs, time::Duration};

use rumqttc::{AsyncClient, EventLoop, MqttOptions, TlsConfiguration, Transport};
use validator::Validate;

use super::{
    config::{Config, TlsConfig},
    error::TransferError,
};

/// Builds an `AsyncClient` / `EventLoop` pair from a validated [`Config`].
///
/// The client is cheap to clone and is used to issue subscriptions; the event
/// loop must be driven by exactly one task (the connection kernel).
pub struct ClientBuilder {
    opts: MqttOptions,
    cap: usize,
}

impl ClientBuilder {
    /// Validates `config` and prepares MQTT options from it.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ConfigError`] when validation fails and
    /// [`TransferError::ClientSetup`] when a TLS file cannot be read.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        config.validate()?;

        let client_id = if config.client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            config.client_id.clone()
        };

        let mut opts = MqttOptions::new(client_id, config.host.clone(), config.port);
        opts.set_keep_alive(Duration::from_secs(config.keep_alive));
        opts.set_clean_session(config.clean_session);

        if let Some(tls) = &config.tls {
            opts.set_transport(tls_transport(tls)?);
        }

        if let Some(username) = &config.username {
            opts.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        Ok(Self {
            opts,
            cap: config.request_channel_capacity,
        })
    }

    /// Client id that will be presented in CONNECT.
    pub fn client_id(&self) -> String {
        self.opts.client_id()
    }

    pub fn build(self) -> (AsyncClient, EventLoop) {
        AsyncClient::new(self.opts, self.cap)
    }
}

/// Loads the certificates named by `tls`. Without a CA certificate the
/// platform roots are used.
fn tls_transport(tls: &TlsConfig) -> Result<Transport, TransferError> {
    let Some(ca_path) = &tls.ca_cert_path else {
        return Ok(Transport::tls_with_default_config());
    };
    let ca = load_file(ca_path)?;

    let client_auth = match (&tls.client_cert_path, &tls.client_key_path) {
        (Some(cert), Some(key)) => Some((load_file(cert)?, load_file(key)?)),
        _ => None,
    };

    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}

fn load_file(path: &str) -> Result<Vec<u8>, TransferError> {
    fs::read(path).map_err(|e| TransferError::ClientSetup(format!("Failed to read '{path}': {e}")))
}
