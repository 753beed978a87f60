//! Runtime components of the agent.
//!
//! * `command`: topic classification and start-payload preparation.
//! * `dispatcher`: routes broker messages to the supervisor and reporter.
//! * `supervisor`: owns the controller child process.
//! * `link`: follows the broker connection state.
//! * `registration` / `status`: outbound HTTP calls to the data API.

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod link;
pub mod registration;
pub mod status;
pub mod supervisor;

/// Current UTC time as RFC 3339, the format used in status reports.
pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
