//! Application configuration resolved from environment variables.
//!
//! The agent is configured entirely through its environment (the deployment
//! scripts on the device export everything). [`Config::from_vars`] is a pure,
//! total function: every value has a default, malformed numbers fall back to
//! their default and nothing is read besides the given mapping. The resolved
//! configuration is immutable for the lifetime of the process.

use std::{collections::HashMap, ffi::OsString};

use self::{agent::AgentConfig, logger::LoggerConfig};

pub mod agent;
pub mod device;
pub mod logger;

/// Simple macros for printing timestamped messages before the tracing subscriber
/// is initialized. These are used during early startup.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// UTC timestamp used by the `print_*` macros.
#[doc(hidden)]
pub fn early_timestamp() -> String {
    let format = time::macros::format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    );
    time::OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_default()
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging subsystem configuration.
    pub logger: LoggerConfig,

    /// Device identity, endpoints, simulation and controller settings.
    pub agent: AgentConfig,
}

impl Config {
    /// Resolves the configuration from the process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(&unicode_vars(std::env::vars_os()))
    }

    /// Resolves the configuration from an explicit variable mapping.
    ///
    /// Never fails; see the module documentation.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let env = Env::new(vars);
        Config {
            logger: LoggerConfig::from_env(&env),
            agent: AgentConfig::from_env(&env),
        }
    }
}

fn unicode_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Read-only view over a variable mapping with the lookup rules shared by
/// every config section.
pub struct Env<'a> {
    vars: &'a HashMap<String, String>,
}

impl<'a> Env<'a> {
    pub fn new(vars: &'a HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Value of `name`, treating an empty string as unset.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Raw value of `name`, including an empty string.
    pub fn raw(&self, name: &str) -> Option<&'a str> {
        self.vars.get(name).map(String::as_str)
    }

    /// First of `names` that is set.
    pub fn first(&self, names: &[&str]) -> Option<&'a str> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn get_or(&self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Parsed value of `name`, or `default` when unset or malformed.
    pub fn parse_or<T: std::str::FromStr>(&self, name: &str, default: T) -> T {
        self.get(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    /// `true` for `1`, `true` or `yes` (case-insensitive), `default` when unset.
    pub fn flag_or(&self, name: &str, default: bool) -> bool {
        self.get(name).map(is_truthy).unwrap_or(default)
    }
}

/// Flag values the agent accepts as "on".
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
