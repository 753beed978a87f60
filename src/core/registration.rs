//! Startup registration with the device API.
//!
//! Two fire-and-forget POSTs made once, in order, before the broker session
//! starts. Their outcome never blocks startup.

use reqwest::Client;
use serde_json::json;

use super::http::{self, ReportOutcome};
use crate::config::{agent::EndpointConfig, device::DeviceId};

#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: Client,
    device_url: String,
    status_url: String,
}

impl RegistrationClient {
    pub fn new(endpoints: &EndpointConfig) -> Self {
        RegistrationClient {
            http: http::client(endpoints.http_timeout),
            device_url: endpoints.registration_url.clone(),
            status_url: endpoints.ready_status_url.clone(),
        }
    }

    /// `POST {"gasId": <id>}` to the registration endpoint.
    pub async fn register_device(&self, device_id: &DeviceId) -> ReportOutcome {
        let body = json!({ "gasId": device_id.as_str() });
        http::post_json(&self.http, &self.device_url, &body, "Device registration").await
    }

    /// `POST {"gas_id": <id>, "status": "ready"}` to the device status endpoint.
    pub async fn register_status(&self, device_id: &DeviceId) -> ReportOutcome {
        let body = json!({ "gas_id": device_id.as_str(), "status": "ready" });
        http::post_json(&self.http, &self.status_url, &body, "Ready status registration").await
    }
}
