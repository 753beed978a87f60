//! On-demand status reports to the data API.

use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    command::Payload,
    http::{self, ReportOutcome},
    now_rfc3339,
    supervisor::ProcessSupervisor,
};
use crate::config::{
    agent::{EndpointConfig, DEVICE_STATUS_PATH},
    device::DeviceId,
};

#[derive(Debug, Clone)]
pub struct StatusReporter {
    http: Client,
    endpoint: Option<Url>,
    device_id: DeviceId,
    supervisor: ProcessSupervisor,
}

impl StatusReporter {
    pub fn new(endpoints: &EndpointConfig, device_id: DeviceId, supervisor: ProcessSupervisor) -> Self {
        StatusReporter {
            http: http::client(endpoints.http_timeout),
            endpoint: endpoints.status_base.as_deref().and_then(status_endpoint),
            device_id,
            supervisor,
        }
    }

    /// Where reports go, `None` when reporting is disabled.
    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    /// Report body: identity, measurement state and timestamp, then `extra`
    /// with its keys taking precedence.
    pub fn body(&self, extra: Payload) -> Payload {
        let snapshot = self.supervisor.snapshot();
        let mut body = Payload::new();
        body.insert("device_id".into(), Value::from(self.device_id.as_str()));
        body.insert("measuring".into(), Value::from(snapshot.measuring));
        body.insert(
            "last_measurement_started_at".into(),
            snapshot.last_started_at.map_or(Value::Null, Value::from),
        );
        body.insert("timestamp".into(), Value::from(now_rfc3339()));
        body.extend(extra);
        body
    }

    /// Sends one report. Never fails; see [`ReportOutcome`].
    pub async fn report_status(&self, extra: Payload) -> ReportOutcome {
        let Some(endpoint) = &self.endpoint else {
            debug!("Status report skipped: no status endpoint configured");
            return ReportOutcome::Skipped;
        };
        let body = Value::Object(self.body(extra));
        http::post_json(&self.http, endpoint.as_str(), &body, "Status report").await
    }
}

/// The status path is absolute, so any path on the base URL is replaced.
fn status_endpoint(base: &str) -> Option<Url> {
    match Url::parse(base).and_then(|url| url.join(DEVICE_STATUS_PATH)) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Invalid status API URL '{}', status reports disabled: {}", base, e);
            None
        }
    }
}
