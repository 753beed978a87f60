//! relaybee: device agent that turns MQTT commands into controller runs
//!
//! The agent registers the device with the data API, subscribes to
//! `device/<ID>/#` on the broker and, on a start command, launches the
//! hardware controller as a child process with the command payload in its
//! environment. Stop commands terminate that process; status commands are
//! answered with a report to the data API.
//!
//! ## Modules
//!
//! * `config`: Configuration resolved from environment variables, with
//!   defaults for every value. Logging settings are validated with the
//!   `validator` crate.
//!
//! * `core`: Runtime components:
//!   - Command classification and payload preparation
//!   - Message dispatcher
//!   - Controller process supervisor
//!   - Registration and status HTTP calls
//!
//! * `logger`: Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.
//!
//! * `signals`: Shutdown signal handling.
//!
//! The broker connection itself lives in the `relaybee-mqtt` crate.

pub mod config;
pub mod core;
pub mod logger;
pub mod signals;
