//! Logging configuration and validation.
//!
//! Resolved from `LOG_LEVEL`, `LOG_FORMAT`, `LOG_ANSI` and `LOG_JOURNALD`.
//! Values are taken as given here and checked by the `validator` rules when the
//! [`LoggerManager`](crate::logger::LoggerManager) is created, so a typo in
//! `LOG_LEVEL` is reported instead of silently ignored.

use validator::{Validate, ValidationError};

use super::Env;

/// Available formats for console log output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    /// Unknown names map to the default format.
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Top-level logging configuration.
#[derive(Debug, Clone, Validate)]
pub struct LoggerConfig {
    /// Global log level: trace, debug, info, warn or error (case-insensitive).
    /// `RUST_LOG`, when set, takes precedence.
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    #[validate(nested)]
    pub console: ConsoleConfig,

    #[validate(nested)]
    pub journald: JournaldConfig,
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

impl LoggerConfig {
    pub fn from_env(env: &Env<'_>) -> Self {
        LoggerConfig {
            level: env.get_or("LOG_LEVEL", "info").trim().to_string(),
            console: ConsoleConfig {
                format: env
                    .get("LOG_FORMAT")
                    .map(LogFormat::from_name)
                    .unwrap_or_default(),
                ansi_colors: env.flag_or("LOG_ANSI", true),
                ..Default::default()
            },
            journald: JournaldConfig {
                enabled: env.flag_or("LOG_JOURNALD", false),
                ..Default::default()
            },
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            console: ConsoleConfig::default(),
            journald: JournaldConfig::default(),
        }
    }
}

/// Console output.
#[derive(Debug, Clone, Validate)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    /// Include the log target (module path).
    pub show_target: bool,
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            ansi_colors: true,
        }
    }
}

/// systemd journald output, for units started by systemd on the device.
#[derive(Debug, Clone, Validate)]
pub struct JournaldConfig {
    pub enabled: bool,

    /// Syslog identifier of the journal entries.
    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "relaybee".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(pairs: &[(&str, &str)]) -> LoggerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LoggerConfig::from_env(&Env::new(&vars))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = resolve(&[]);
        assert_eq!(config.level, "info");
        assert_eq!(config.console.format, LogFormat::Compact);
        assert!(config.console.ansi_colors);
        assert!(!config.journald.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = resolve(&[
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_FORMAT", "json"),
            ("LOG_ANSI", "0"),
            ("LOG_JOURNALD", "yes"),
        ]);
        assert_eq!(config.level, "DEBUG");
        assert_eq!(config.console.format, LogFormat::Json);
        assert!(!config.console.ansi_colors);
        assert!(config.journald.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_level_fails_validation() {
        let config = resolve(&[("LOG_LEVEL", "verbose")]);
        let err = config.validate().unwrap_err();
        assert!(err.field_errors().contains_key("level"));
    }

    #[test]
    fn test_unknown_format_falls_back_to_compact() {
        assert_eq!(resolve(&[("LOG_FORMAT", "fancy")]).console.format, LogFormat::Compact);
    }
}
