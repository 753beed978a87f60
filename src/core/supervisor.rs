//! Controller process supervision.
//!
//! The `ProcessSupervisor` owns the only handle to the hardware controller.
//! Its state is an explicit [`MeasurementState`]: a start while `Measuring`
//! is rejected, a stop while `Idle` is a logged no-op. The supervisor is
//! cheap to clone; all clones share the same state, which is how the
//! dispatcher and the status reporter observe one measurement.
//!
//! The state sits behind a `std::sync::Mutex` that is never held across an
//! await point. A stop never touches the process directly: it is forwarded
//! over a oneshot channel to the task waiting on the [`Child`], which is the
//! only place that signals it, so a reaped pid is never signalled.

use std::{
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    process::{Child, Command},
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{
    command::Payload,
    error::{ExitStatusKind, SupervisorError},
    now_rfc3339,
};
use crate::config::{agent::AgentConfig, device::DeviceId};

/// Everything needed to launch the controller.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub device_id: DeviceId,
    pub interpreter: PathBuf,
    pub entry: PathBuf,
    pub working_dir: Option<PathBuf>,
    /// Forwarded as `GPIO_SIMULATION` only when set in our environment.
    pub simulation_flag: Option<String>,
}

impl SupervisorSettings {
    pub fn from_config(agent: &AgentConfig) -> Self {
        SupervisorSettings {
            device_id: agent.device_id.clone(),
            interpreter: agent.controller.interpreter.clone(),
            entry: agent.controller.entry.clone(),
            working_dir: agent.controller.working_dir().map(PathBuf::from),
            simulation_flag: agent.simulation.raw_flag.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementState {
    Idle,
    Measuring {
        /// Distinguishes runs so a late exit cannot clear a newer session.
        session: u64,
        pid: Option<u32>,
        started_at: String,
    },
}

impl MeasurementState {
    pub fn is_measuring(&self) -> bool {
        matches!(self, MeasurementState::Measuring { .. })
    }
}

/// Point-in-time view used by status reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSnapshot {
    pub measuring: bool,
    pub last_started_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Termination handed to the waiting task; exit is not awaited.
    Requested { pid: Option<u32> },
    NotRunning,
}

/// Output captured from a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
struct Inner {
    state: MeasurementState,
    last_started_at: Option<String>,
    next_session: u64,
    /// Reaches the task that owns the running child.
    stop_tx: Option<oneshot::Sender<()>>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    settings: Arc<SupervisorSettings>,
    inner: Arc<Mutex<Inner>>,
}

impl ProcessSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            inner: Arc::new(Mutex::new(Inner {
                state: MeasurementState::Idle,
                last_started_at: None,
                next_session: 0,
                stop_tx: None,
            })),
        }
    }

    pub fn state(&self) -> MeasurementState {
        lock(&self.inner).state.clone()
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        let inner = lock(&self.inner);
        SupervisorSnapshot {
            measuring: inner.state.is_measuring(),
            last_started_at: inner.last_started_at.clone(),
        }
    }

    /// Starts the controller and runs it to completion.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start) and [`RunningMeasurement::wait`].
    pub async fn run(&self, payload: &Payload) -> Result<RunOutput, SupervisorError> {
        self.start(payload)?.wait().await
    }

    /// Launches the controller with `payload` and moves to `Measuring`.
    ///
    /// The child inherits our environment plus `DEVICE_ID`, `MQTT_PAYLOAD`
    /// (the payload as JSON) and, when it was set for us, `GPIO_SIMULATION`.
    /// It runs in the entry point's directory. Its stdout and stderr are
    /// relayed to ours while being captured.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::AlreadyRunning`] while a measurement is in flight,
    /// [`SupervisorError::Spawn`] when the process cannot be created (the
    /// state stays `Idle`).
    pub fn start(&self, payload: &Payload) -> Result<RunningMeasurement, SupervisorError> {
        let payload_json = serde_json::to_string(payload)?;

        let mut inner = lock(&self.inner);
        if let MeasurementState::Measuring { started_at, .. } = &inner.state {
            return Err(SupervisorError::AlreadyRunning {
                started_at: started_at.clone(),
            });
        }

        let mut child = self
            .command(&payload_json)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: self.settings.interpreter.display().to_string(),
                source,
            })?;

        let pid = child.id();
        let started_at = now_rfc3339();
        inner.next_session += 1;
        let session = inner.next_session;
        inner.state = MeasurementState::Measuring {
            session,
            pid,
            started_at: started_at.clone(),
        };
        inner.last_started_at = Some(started_at);
        let (stop_tx, stop_rx) = oneshot::channel();
        inner.stop_tx = Some(stop_tx);
        drop(inner);

        info!(
            "Controller started (pid {}): {} {}",
            pid.map_or_else(|| "?".to_string(), |p| p.to_string()),
            self.settings.interpreter.display(),
            self.settings.entry.display()
        );

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(relay(out, tokio::io::stdout())));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(relay(err, tokio::io::stderr())));

        Ok(RunningMeasurement {
            child,
            pid,
            stdout,
            stderr,
            stop_rx,
            guard: SessionGuard {
                session,
                inner: Arc::clone(&self.inner),
            },
        })
    }

    /// Asks the running controller to terminate and returns to `Idle`
    /// immediately, without waiting for the process to exit.
    ///
    /// SIGTERM is sent by [`RunningMeasurement::wait`], so a run that is
    /// never waited on is not signalled.
    pub fn stop(&self) -> StopOutcome {
        let (pid, stop_tx) = {
            let mut inner = lock(&self.inner);
            let pid = match &inner.state {
                MeasurementState::Idle => None,
                MeasurementState::Measuring { pid, .. } => *pid,
            };
            inner.state = MeasurementState::Idle;
            (pid, inner.stop_tx.take())
        };

        let Some(stop_tx) = stop_tx else {
            info!("Stop requested but no controller is running");
            return StopOutcome::NotRunning;
        };

        if stop_tx.send(()).is_err() {
            warn!("Stop requested but the controller handle is gone");
            return StopOutcome::NotRunning;
        }
        info!(
            "Stopping controller (pid {})",
            pid.map_or_else(|| "?".to_string(), |p| p.to_string())
        );
        StopOutcome::Requested { pid }
    }

    fn command(&self, payload_json: &str) -> Command {
        let mut command = Command::new(&self.settings.interpreter);
        command
            .arg(&self.settings.entry)
            .env("DEVICE_ID", self.settings.device_id.as_str())
            .env("MQTT_PAYLOAD", payload_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(flag) = &self.settings.simulation_flag {
            command.env("GPIO_SIMULATION", flag);
        }
        if let Some(dir) = &self.settings.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

/// Returns the supervisor to `Idle` when its run ends, unless a stop (or a
/// newer run) already replaced the session.
#[derive(Debug)]
struct SessionGuard {
    session: u64,
    inner: Arc<Mutex<Inner>>,
}

impl SessionGuard {
    fn release(&self) {
        let mut inner = lock(&self.inner);
        if matches!(
            inner.state,
            MeasurementState::Measuring { session, .. } if session == self.session
        ) {
            inner.state = MeasurementState::Idle;
            inner.stop_tx = None;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A launched controller. Dropping it without waiting still frees the
/// supervisor, but leaves the process running.
#[derive(Debug)]
pub struct RunningMeasurement {
    child: Child,
    pid: Option<u32>,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
    stop_rx: oneshot::Receiver<()>,
    guard: SessionGuard,
}

impl RunningMeasurement {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Waits for the controller to exit, sending it SIGTERM if a stop
    /// arrives first.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Exited`] for any exit other than code 0, carrying
    /// the captured stderr (stdout when stderr is empty).
    pub async fn wait(mut self) -> Result<RunOutput, SupervisorError> {
        let status = tokio::select! {
            biased;
            status = self.child.wait() => status,
            Ok(()) = &mut self.stop_rx => {
                // `id()` is `None` once the child has been reaped.
                if let Some(pid) = self.child.id() {
                    info!("Sending SIGTERM to controller (pid {})", pid);
                    if let Err(e) = terminate(pid) {
                        warn!("{}", e);
                    }
                }
                self.child.wait().await
            }
        };
        self.guard.release();

        let stdout = collect(self.stdout.take()).await;
        let stderr = collect(self.stderr.take()).await;
        let status = status.map_err(SupervisorError::Wait)?;

        if status.success() {
            debug!("Controller exited successfully");
            return Ok(RunOutput { stdout, stderr });
        }

        let output = if stderr.is_empty() { stdout } else { stderr };
        Err(SupervisorError::Exited {
            status: ExitStatusKind::from(status),
            output: output.trim_end().to_string(),
        })
    }
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_else(|e| {
            warn!("Controller output relay failed: {}", e);
            String::new()
        }),
        None => String::new(),
    }
}

/// Copies `source` to `sink` line by line and returns everything copied.
async fn relay<R, W>(source: R, mut sink: W) -> String
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut captured = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                captured.extend_from_slice(&line);
                if let Err(e) = sink.write_all(&line).await {
                    debug!("Failed to relay controller output: {}", e);
                }
                let _ = sink.flush().await;
            }
            Err(e) => {
                warn!("Failed to read controller output: {}", e);
                break;
            }
        }
    }

    String::from_utf8_lossy(&captured).into_owned()
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<(), SupervisorError> {
    use nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    };

    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        reason: "pid out of range".to_string(),
    })?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|errno| SupervisorError::Signal {
        pid,
        reason: errno.to_string(),
    })
}

#[cfg(not(unix))]
fn terminate(pid: u32) -> Result<(), SupervisorError> {
    Err(SupervisorError::Signal {
        pid,
        reason: "termination signals are only supported on Unix".to_string(),
    })
}
