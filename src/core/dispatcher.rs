//! Routes broker messages to the supervisor and the status reporter.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relaybee_mqtt::SessionEvent;

use super::{
    command::{prepare_start_payload, relative_topic, CommandKind, CommandMessage, Payload},
    error::SupervisorError,
    http::ReportOutcome,
    status::StatusReporter,
    supervisor::{ProcessSupervisor, RunOutput, RunningMeasurement, StopOutcome},
};
use crate::config::agent::SimulationConfig;

/// What handling one command amounted to.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The controller ran and exited with 0.
    Completed(RunOutput),
    /// The controller could not be started or exited unsuccessfully.
    Failed(String),
    /// A measurement was already running.
    Rejected { started_at: String },
    Stopped { pid: Option<u32> },
    NotRunning,
    StatusReported(ReportOutcome),
    Ignored,
}

pub struct Dispatcher {
    prefix: String,
    simulation: SimulationConfig,
    supervisor: ProcessSupervisor,
    reporter: StatusReporter,
}

impl Dispatcher {
    pub fn new(
        prefix: String,
        simulation: SimulationConfig,
        supervisor: ProcessSupervisor,
        reporter: StatusReporter,
    ) -> Self {
        Dispatcher {
            prefix,
            simulation,
            supervisor,
            reporter,
        }
    }

    /// Handles one command to completion, including a whole controller run.
    pub async fn handle(&self, message: CommandMessage) -> DispatchOutcome {
        match self.classify(&message) {
            CommandKind::Start => match self.start(message.payload) {
                Ok(running) => finish(running.wait().await),
                Err(outcome) => outcome,
            },
            CommandKind::Stop => self.stop(),
            CommandKind::Status => {
                DispatchOutcome::StatusReported(self.reporter.report_status(message.payload).await)
            }
            CommandKind::Other => DispatchOutcome::Ignored,
        }
    }

    /// Session loop. Controller runs and status reports are moved to their
    /// own tasks so a stop arriving mid-measurement is handled at once.
    pub async fn run(&self, mut events: mpsc::Receiver<SessionEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Dispatcher cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        debug!("Session event channel closed");
                        break;
                    }
                },
            }
        }
    }

    fn on_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => info!("Listening for commands on {}#", self.prefix),
            SessionEvent::Disconnected(reason) => warn!("Broker connection lost: {}", reason),
            SessionEvent::Message(incoming) => {
                let message = CommandMessage::from_bytes(incoming.topic, &incoming.payload);
                self.spawn_handler(message);
            }
        }
    }

    fn spawn_handler(&self, message: CommandMessage) {
        match self.classify(&message) {
            CommandKind::Start => {
                if let Ok(running) = self.start(message.payload) {
                    tokio::spawn(async move {
                        finish(running.wait().await);
                    });
                }
            }
            CommandKind::Stop => {
                self.stop();
            }
            CommandKind::Status => {
                let reporter = self.reporter.clone();
                tokio::spawn(async move {
                    reporter.report_status(message.payload).await;
                });
            }
            CommandKind::Other => {}
        }
    }

    fn classify(&self, message: &CommandMessage) -> CommandKind {
        let payload = Value::Object(message.payload.clone());
        info!("Received message on {}: {}", message.topic, payload);

        let relative = relative_topic(&message.topic, &self.prefix);
        let kind = CommandKind::classify(relative);
        if kind == CommandKind::Other {
            info!("No action for topic {} (payload {})", message.topic, payload);
        }
        kind
    }

    fn start(&self, payload: Payload) -> Result<RunningMeasurement, DispatchOutcome> {
        let (payload, simulated) = prepare_start_payload(payload, &self.simulation);
        if simulated {
            let filled = Value::Object(payload.clone());
            info!("Simulation mode: starting controller with {}", filled);
        }

        match self.supervisor.start(&payload) {
            Ok(running) => Ok(running),
            Err(SupervisorError::AlreadyRunning { started_at }) => {
                warn!(
                    "Start ignored: a measurement is already running (started at {})",
                    started_at
                );
                Err(DispatchOutcome::Rejected { started_at })
            }
            Err(e) => {
                error!("Failed to start controller: {}", e);
                Err(DispatchOutcome::Failed(e.to_string()))
            }
        }
    }

    fn stop(&self) -> DispatchOutcome {
        match self.supervisor.stop() {
            StopOutcome::Requested { pid } => DispatchOutcome::Stopped { pid },
            StopOutcome::NotRunning => DispatchOutcome::NotRunning,
        }
    }
}

fn finish(result: Result<RunOutput, SupervisorError>) -> DispatchOutcome {
    match result {
        Ok(output) => {
            info!("Measurement complete: controller finished");
            DispatchOutcome::Completed(output)
        }
        Err(e) => {
            error!("Measurement failed: {}", e);
            DispatchOutcome::Failed(e.to_string())
        }
    }
}
