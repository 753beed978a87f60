//! Outbound JSON POSTs shared by registration and status reporting.
//!
//! Every call is a single attempt. Failures are logged here and reported to
//! the caller as a [`ReportOutcome`], never as an error.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, warn};

/// Result of one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No endpoint configured; nothing was sent.
    Skipped,
    /// 2xx response.
    Delivered(u16),
    /// Non-2xx response.
    Rejected(u16),
    /// Timeout or transport error.
    Failed,
}

impl ReportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ReportOutcome::Delivered(_))
    }
}

/// Builds the HTTP client with the configured request timeout.
pub fn client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
            Client::new()
        })
}

/// POSTs `body` as JSON to `url`; `what` names the call in log lines.
pub async fn post_json(client: &Client, url: &str, body: &Value, what: &str) -> ReportOutcome {
    let response = match client.post(url).json(body).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            error!("{} to {} timed out", what, url);
            return ReportOutcome::Failed;
        }
        Err(e) => {
            error!("{} to {} failed: {}", what, url, e);
            return ReportOutcome::Failed;
        }
    };

    let status = response.status();
    if status.is_success() {
        info!("{} succeeded (HTTP {})", what, status.as_u16());
        return ReportOutcome::Delivered(status.as_u16());
    }

    let text = response.text().await.unwrap_or_default();
    error!(
        "{} rejected with HTTP {}: {}",
        what,
        status.as_u16(),
        text.trim()
    );
    ReportOutcome::Rejected(status.as_u16())
}
