//! Broker link monitoring.
//!
//! Follows the session's [`ConnectionState`] channel and reports how long
//! each outage lasted once the broker is reachable again.

use std::time::Duration;

use relaybee_mqtt::ConnectionState;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, info};

/// Runs until the session drops its state sender. Returns the outages seen.
pub async fn watch_link(mut state_rx: watch::Receiver<ConnectionState>) -> Vec<Duration> {
    debug!("Watching broker link state");
    let mut lost_at: Option<Instant> = None;
    let mut outages = Vec::new();

    while state_rx.changed().await.is_ok() {
        let state = state_rx.borrow_and_update().clone();
        match state {
            ConnectionState::Connected => match lost_at.take() {
                Some(since) => {
                    let outage = since.elapsed();
                    info!("Broker link restored after {:.1}s", outage.as_secs_f64());
                    outages.push(outage);
                }
                None => info!("Broker link up"),
            },
            ConnectionState::Disconnected(reason) => {
                lost_at.get_or_insert_with(Instant::now);
                debug!("Broker link down: {}", reason);
            }
            ConnectionState::Reconnecting(seconds) => {
                debug!("Next broker connection attempt in {:.0}s", seconds)
            }
            ConnectionState::Connecting => debug!("Connecting to broker"),
        }
    }

    debug!("Broker link state channel closed");
    outages
}
