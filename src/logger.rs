//! Logging initialization.
//!
//! The `LoggerManager` validates the logging configuration and installs the
//! global `tracing` subscriber with a console layer and, on systemd hosts, a
//! journald layer.

use std::io;

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig},
    print_info, print_warn,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// IO error, typically while opening the journald socket.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to install global subscriber: {0}")]
    InitializationError(String),

    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,
}

pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// # Errors
    ///
    /// Returns `LoggerError::ValidationError` if configuration validation fails.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        Ok(LoggerManager { config })
    }

    /// Installs the global subscriber. Call once, before any other task logs.
    ///
    /// A journald failure is only fatal when journald would have been the sole
    /// output.
    ///
    /// # Errors
    ///
    /// Returns an error if no layer could be built or a global subscriber is
    /// already installed.
    pub fn init(&self) -> Result<(), LoggerError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if self.config.console.enabled {
            layers.push(self.console_layer(&self.config.console));
        }

        if self.config.journald.enabled {
            match self.journald_layer() {
                Ok(layer) => {
                    layers.push(layer);
                    print_info!(
                        "Systemd journald logger initialized with identifier: {}",
                        self.config.journald.identifier
                    );
                }
                Err(e) => {
                    print_warn!("Failed to initialize systemd journald logger: {}", e);
                }
            }
        }

        if layers.is_empty() {
            return Err(LoggerError::NoLayersConfigured);
        }

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    /// `RUST_LOG` wins over the configured level.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.to_lowercase()))
    }

    fn console_layer(&self, config: &ConsoleConfig) -> BoxedLayer {
        let base = fmt::layer()
            .with_target(config.show_target)
            .with_ansi(config.ansi_colors)
            .with_writer(io::stdout);

        match config.format {
            LogFormat::Json => base.json().with_filter(self.filter()).boxed(),
            LogFormat::Pretty => base.pretty().with_filter(self.filter()).boxed(),
            LogFormat::Compact => base.compact().with_filter(self.filter()).boxed(),
        }
    }

    fn journald_layer(&self) -> Result<BoxedLayer, LoggerError> {
        let layer = tracing_journald::layer()?
            .with_syslog_identifier(self.config.journald.identifier.clone());
        Ok(layer.with_filter(self.filter()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_level() {
        let config = LoggerConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(matches!(
            LoggerManager::new(config),
            Err(LoggerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_no_layers_is_an_error() {
        let mut config = LoggerConfig::default();
        config.console.enabled = false;
        config.journald.enabled = false;
        let manager = LoggerManager::new(config).unwrap();
        assert!(matches!(
            manager.init(),
            Err(LoggerError::NoLayersConfigured)
        ));
    }
}
