//! The connection kernel: drives the rumqttc event loop for the lifetime of
//! the session.
//!
//! ```text
//! MqttSession::start
//!     ↓ spawns
//! ConnectionKernel::run  ── SessionEvent ──▶ application (mpsc)
//!     ↓ polls                  └─ ConnectionState ─▶ observers (watch)
//! rumqttc EventLoop
//! ```
//!
//! Reconnect policy is flat: every error is followed by the same
//! fixed sleep and another poll, forever. rumqttc re-dials on the next poll
//! after an error, and because sessions are clean the kernel re-subscribes to
//! every filter each time a CONNACK arrives.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    event::{IncomingMessage, SessionEvent},
    state::ConnectionState,
};

/// How long shutdown waits for the DISCONNECT packet to be flushed.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub struct ConnectionKernel {
    client: AsyncClient,
    event_loop: EventLoop,
    /// Filters re-issued after every successful CONNACK.
    subscriptions: Vec<String>,
    reconnect_interval: Duration,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: mpsc::Sender<SessionEvent>,
}

impl ConnectionKernel {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        subscriptions: Vec<String>,
        reconnect_interval: Duration,
        events_tx: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            subscriptions,
            reconnect_interval,
            cancel,
            state_tx,
            state_rx,
            events_tx,
        }
    }

    /// Receiver that always holds the latest connection state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn update_state(&self, state: ConnectionState) {
        let changed = *self.state_tx.borrow() != state;
        if changed {
            debug!("Connection state changed to: {}", state);
            // Receivers may all be gone during shutdown.
            let _ = self.state_tx.send(state);
        }
    }

    async fn emit(&mut self, event: SessionEvent) {
        if self.events_tx.send(event).await.is_err() {
            warn!("Session event receiver dropped, event discarded");
        }
    }

    /// Runs until the cancellation token fires.
    ///
    /// Never returns on its own: connection errors are logged, surfaced as
    /// [`SessionEvent::Disconnected`] and retried after the fixed interval.
    pub async fn run(&mut self) {
        self.update_state(ConnectionState::Connecting);
        info!("Starting connection event loop...");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, disconnecting from broker...");
                    self.disconnect().await;
                    info!("Connection kernel shutdown completed");
                    return;
                }

                polled = self.event_loop.poll() => {
                    match polled {
                        Ok(event) => self.handle_event(event).await,
                        Err(e) => {
                            if !self.wait_before_reconnect(e).await {
                                info!("Shutdown requested while waiting to reconnect");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Reports a poll error and sleeps the reconnect interval.
    ///
    /// Returns `false` if cancellation arrived during the sleep.
    async fn wait_before_reconnect(&mut self, err: ConnectionError) -> bool {
        let reason = get_error_message(&err);
        self.update_state(ConnectionState::Disconnected(reason.clone()));
        self.emit(SessionEvent::Disconnected(reason.clone())).await;

        let delay = self.reconnect_interval;
        error!(
            "Reconnecting in {:.1} seconds due to error: {}",
            delay.as_secs_f64(),
            reason
        );
        self.update_state(ConnectionState::Reconnecting(delay.as_secs_f64()));

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => {
                self.update_state(ConnectionState::Connecting);
                true
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connection established successfully");
                    self.update_state(ConnectionState::Connected);
                    self.resubscribe();
                    self.emit(SessionEvent::Connected).await;
                } else {
                    warn!("Broker refused connection: {:?}", ack.code);
                }
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                for code in &ack.return_codes {
                    match code {
                        SubscribeReasonCode::Success(qos) => {
                            debug!("Subscription granted (pkid {}) with {:?}", ack.pkid, qos)
                        }
                        SubscribeReasonCode::Failure => {
                            error!("Subscription rejected by broker (pkid {})", ack.pkid)
                        }
                    }
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                trace!("Received publish on topic {}", publish.topic);
                self.emit(SessionEvent::Message(IncomingMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                }))
                .await;
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
                let reason = "Disconnected by broker".to_string();
                self.update_state(ConnectionState::Disconnected(reason.clone()));
                self.emit(SessionEvent::Disconnected(reason)).await;
            }
            Event::Incoming(_) => {}
            Event::Outgoing(outgoing) => trace!("Outgoing packet: {:?}", outgoing),
        }
    }

    /// Queues a QoS 1 SUBSCRIBE for every configured filter.
    ///
    /// Uses `try_subscribe` because this runs on the task that drains the
    /// request channel; awaiting here could deadlock on a full channel.
    fn resubscribe(&self) {
        for filter in &self.subscriptions {
            match self.client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                Ok(()) => info!("Subscribing to {}", filter),
                Err(e) => error!("Failed to subscribe to {}: {}", filter, e),
            }
        }
    }

    /// Best-effort DISCONNECT: queue it and poll until it has gone out.
    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("Error queueing disconnect packet: {}", e);
            return;
        }

        let event_loop = &mut self.event_loop;
        let flush = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush)
            .await
            .is_err()
        {
            debug!("Timed out flushing disconnect packet");
        }
        self.update_state(ConnectionState::Disconnected("Shutdown".into()));
    }
}

/// Innermost message of an error chain, without surrounding quotes.
fn get_error_message(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
