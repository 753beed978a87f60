use thiserror::Error;

/// Failures of a controller run.
///
/// Spawn failures and non-zero exits take the same path in the dispatcher:
/// they are logged and the agent waits for the next command.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A measurement is already in flight; the new start was not launched.
    #[error("A measurement is already running (started at {started_at})")]
    AlreadyRunning { started_at: String },

    /// The controller could not be started at all.
    #[error("Failed to spawn controller '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The controller ran and exited unsuccessfully.
    ///
    /// `output` is the captured stderr, or stdout when stderr was empty.
    #[error("controller exited with {status}: {output}")]
    Exited { status: ExitStatusKind, output: String },

    /// Waiting on the child failed.
    #[error("Failed to wait for controller: {0}")]
    Wait(#[source] std::io::Error),

    /// Delivering the termination signal failed.
    #[error("Failed to signal controller (pid {pid}): {reason}")]
    Signal { pid: u32, reason: String },

    #[error("Payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// How the controller ended when it did not exit with 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatusKind {
    Code(i32),
    /// Terminated by a signal (Unix).
    Signal(i32),
    Unknown,
}

impl std::fmt::Display for ExitStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatusKind::Code(code) => write!(f, "code {code}"),
            ExitStatusKind::Signal(signal) => write!(f, "signal {signal}"),
            ExitStatusKind::Unknown => f.write_str("unknown status"),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatusKind {
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatusKind::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatusKind::Signal(signal);
            }
        }
        ExitStatusKind::Unknown
    }
}
