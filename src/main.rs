use std::{process, sync::OnceLock};

use relaybee::{
    config::Config,
    core::{
        dispatcher::Dispatcher,
        link::watch_link,
        registration::RegistrationClient,
        status::StatusReporter,
        supervisor::{ProcessSupervisor, SupervisorSettings},
    },
    logger::LoggerManager,
    print_error,
    signals::wait_for_shutdown_signal,
};
use relaybee_mqtt::MqttSession;
use tracing::{debug, error, info, warn};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

#[tokio::main]
async fn main() {
    let cfg = config();
    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting relaybee version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);

    let agent = &cfg.agent;
    debug!("{:#?}", agent);
    info!("Device ID: {}", agent.device_id);
    info!(
        "Simulation mode: {}",
        if agent.simulation.enabled { "on" } else { "off" }
    );
    info!(
        "Controller: {} {}",
        agent.controller.interpreter.display(),
        agent.controller.entry.display()
    );
    if !agent.controller.entry.exists() {
        warn!(
            "Controller entry point {} does not exist yet",
            agent.controller.entry.display()
        );
    }

    let registration = RegistrationClient::new(&agent.endpoints);
    registration.register_device(&agent.device_id).await;
    registration.register_status(&agent.device_id).await;

    let transport = agent.transport().unwrap_or_else(|e| {
        error!("Invalid broker configuration: {}", e);
        process::exit(1);
    });

    let supervisor = ProcessSupervisor::new(SupervisorSettings::from_config(agent));
    let reporter = StatusReporter::new(
        &agent.endpoints,
        agent.device_id.clone(),
        supervisor.clone(),
    );
    match reporter.endpoint() {
        Some(url) => info!("Status reports go to {}", url),
        None => info!("Status reports disabled"),
    }
    let dispatcher = Dispatcher::new(
        agent.device_id.topic_prefix(),
        agent.simulation.clone(),
        supervisor,
        reporter,
    );

    let (session, events) = MqttSession::start(&transport, vec![agent.device_id.topic_filter()])
        .unwrap_or_else(|e| {
            error!("Failed to start MQTT session: {}", e);
            process::exit(1);
        });
    info!(
        "MQTT client '{}' subscribing to {}",
        session.client_id(),
        agent.device_id.topic_filter()
    );
    tokio::spawn(watch_link(session.state_receiver()));

    let cancel = session.cancel_token();
    tokio::select! {
        _ = dispatcher.run(events, cancel.child_token()) => {
            warn!("Session event stream ended");
        }
        _ = shutdown_signal() => {}
    }

    if let Err(e) = session.shutdown().await {
        error!("MQTT session shutdown failed: {}", e);
    }
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    match wait_for_shutdown_signal().await {
        Ok(name) => info!("Received {}, initiating graceful shutdown...", name),
        Err(e) => {
            error!("Failed to listen for shutdown signals: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
