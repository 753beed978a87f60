//! Agent settings: identity, broker, HTTP endpoints, simulation and the
//! controller process.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use relaybee_mqtt::TransferError;

use super::{device::DeviceId, is_truthy, Env};

const DEFAULT_MQTT_URL: &str = "mqtt://localhost:1883";
const DEFAULT_REGISTRATION_URL: &str = "http://localhost:3001/api/v1/DeviceAP";
const DEFAULT_DATA_API_URL: &str = "http://localhost:3001";

/// Path of the device status resource on the data API.
pub const DEVICE_STATUS_PATH: &str = "/mqtt/api/v1/device/status";

const DEFAULT_CONTROLLER_MAIN: &str = "gpio_controller/main.py";
const DEFAULT_PYTHON_BIN: &str = "python3";

const DEFAULT_TEST_GAS_ID: &str = "FFFFF";
const DEFAULT_TEST_TEST_ID: &str = "00000";
const DEFAULT_TEST_PROFILE_ID: i64 = 14;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub device_id: DeviceId,
    pub broker: BrokerConfig,
    pub endpoints: EndpointConfig,
    pub simulation: SimulationConfig,
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub client_id: String,
    pub keep_alive: u64,
    pub reconnect_interval: u64,
    /// Certificate files, used only with an `mqtts://` URL.
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Device registration endpoint (`POST {gasId}`).
    pub registration_url: String,
    /// Full URL of the startup "ready" status registration.
    pub ready_status_url: String,
    /// Base URL for on-demand status reports; `None` disables reporting.
    pub status_base: Option<String>,
    /// Timeout applied to every outbound request.
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Simulation forced on by the environment.
    pub enabled: bool,
    /// `GPIO_SIMULATION` exactly as set, forwarded to the controller only when
    /// present.
    pub raw_flag: Option<String>,
    pub fallback: SimulationFallback,
}

/// Values substituted for missing identifiers in simulation mode.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationFallback {
    pub gas_id: String,
    pub test_id: String,
    pub profile_id: i64,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub interpreter: PathBuf,
    pub entry: PathBuf,
}

impl AgentConfig {
    pub fn from_env(env: &Env<'_>) -> Self {
        let device_id = DeviceId::resolve(env.get("DEVICE_ID"));

        let broker = BrokerConfig {
            url: env.get_or("MQTT_URL", DEFAULT_MQTT_URL).trim().to_string(),
            client_id: env
                .get("MQTT_CLIENT_ID")
                .map(str::to_string)
                .unwrap_or_else(|| format!("device-{}", device_id)),
            keep_alive: env.parse_or("MQTT_KEEP_ALIVE_SECS", 60),
            reconnect_interval: env.parse_or(
                "MQTT_RECONNECT_SECS",
                relaybee_mqtt::config::DEFAULT_RECONNECT_INTERVAL,
            ),
            ca_cert: env.get("MQTT_CA_CERT").map(str::to_string),
            client_cert: env.get("MQTT_CLIENT_CERT").map(str::to_string),
            client_key: env.get("MQTT_CLIENT_KEY").map(str::to_string),
        };

        let data_api = trim_trailing_slashes(
            env.first(&["DATA_API_URL", "API_BASE_URL"])
                .unwrap_or(DEFAULT_DATA_API_URL),
        );
        let status_path = env.get_or("DATA_API_DEVICE_STATUS_PATH", DEVICE_STATUS_PATH);
        let endpoints = EndpointConfig {
            registration_url: env
                .get_or("DEVICE_AP_URL", DEFAULT_REGISTRATION_URL)
                .to_string(),
            ready_status_url: format!("{data_api}{status_path}"),
            status_base: env
                .first(&["STATUS_API_URL", "DATA_API_URL", "API_BASE_URL"])
                .map(trim_trailing_slashes)
                .filter(|base| !base.is_empty()),
            http_timeout: Duration::from_secs(
                env.parse_or("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)
                    .max(1),
            ),
        };

        let simulation = SimulationConfig {
            enabled: env.get("GPIO_SIMULATION").is_some_and(is_truthy),
            raw_flag: env.raw("GPIO_SIMULATION").map(str::to_string),
            fallback: SimulationFallback {
                gas_id: env
                    .get_or("TEST_GAS_ID", DEFAULT_TEST_GAS_ID)
                    .trim()
                    .to_uppercase(),
                test_id: env
                    .get_or("TEST_TEST_ID", DEFAULT_TEST_TEST_ID)
                    .trim()
                    .to_string(),
                profile_id: env.parse_or("TEST_PROFILE_ID", DEFAULT_TEST_PROFILE_ID),
            },
        };

        let controller = ControllerConfig {
            interpreter: resolve_interpreter(env),
            entry: absolutize(PathBuf::from(
                env.get_or("GPIO_CONTROLLER_MAIN", DEFAULT_CONTROLLER_MAIN),
            )),
        };

        AgentConfig {
            device_id,
            broker,
            endpoints,
            simulation,
            controller,
        }
    }

    /// Broker session settings for `relaybee-mqtt`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidUrl`] when `MQTT_URL` cannot be parsed.
    pub fn transport(&self) -> Result<relaybee_mqtt::Config, TransferError> {
        let mut config = relaybee_mqtt::Config::from_url(&self.broker.url, &self.broker.client_id)?;
        config.keep_alive = self.broker.keep_alive;
        config.reconnect_interval = self.broker.reconnect_interval;
        if let Some(tls) = config.tls.as_mut() {
            tls.ca_cert_path = self.broker.ca_cert.clone();
            tls.client_cert_path = self.broker.client_cert.clone();
            tls.client_key_path = self.broker.client_key.clone();
        }
        Ok(config)
    }
}

fn trim_trailing_slashes(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// `GPIO_VENV` wins over `PYTHON_BIN`; `python3` from `PATH` otherwise.
fn resolve_interpreter(env: &Env<'_>) -> PathBuf {
    if let Some(venv) = env.get("GPIO_VENV") {
        let venv = absolutize(PathBuf::from(venv));
        return if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python")
        };
    }
    PathBuf::from(env.get_or("PYTHON_BIN", DEFAULT_PYTHON_BIN))
}

/// The controller runs with its own directory as working directory, so any
/// relative path has to be pinned to ours first.
fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::path::absolute(&path).unwrap_or(path)
}

impl ControllerConfig {
    /// Directory the controller runs in.
    pub fn working_dir(&self) -> Option<&Path> {
        self.entry.parent().filter(|dir| !dir.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(pairs: &[(&str, &str)]) -> AgentConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_env(&Env::new(&vars))
    }

    #[test]
    fn test_defaults() {
        let config = resolve(&[]);
        assert_eq!(config.device_id.as_str(), "FFFFF");
        assert_eq!(config.broker.url, DEFAULT_MQTT_URL);
        assert_eq!(config.broker.client_id, "device-FFFFF");
        assert_eq!(config.broker.reconnect_interval, 3);
        assert_eq!(
            config.endpoints.ready_status_url,
            "http://localhost:3001/mqtt/api/v1/device/status"
        );
        assert_eq!(config.endpoints.status_base, None);
        assert_eq!(config.endpoints.http_timeout, Duration::from_secs(10));
        assert_eq!(
            config.simulation.fallback,
            SimulationFallback {
                gas_id: "FFFFF".into(),
                test_id: "00000".into(),
                profile_id: 14,
            }
        );
        assert_eq!(config.simulation.raw_flag, None);
        assert_eq!(config.controller.interpreter, PathBuf::from("python3"));
        assert!(config.controller.entry.is_absolute());
        assert!(config.controller.entry.ends_with("gpio_controller/main.py"));
    }

    #[test]
    fn test_client_id_follows_device_id() {
        let config = resolve(&[("DEVICE_ID", "ab123")]);
        assert_eq!(config.broker.client_id, "device-AB123");

        let config = resolve(&[("DEVICE_ID", "ab123"), ("MQTT_CLIENT_ID", "custom")]);
        assert_eq!(config.broker.client_id, "custom");
    }

    #[test]
    fn test_status_base_precedence() {
        let config = resolve(&[
            ("STATUS_API_URL", "http://status.local/"),
            ("DATA_API_URL", "http://data.local"),
        ]);
        assert_eq!(config.endpoints.status_base.as_deref(), Some("http://status.local"));
        assert_eq!(
            config.endpoints.ready_status_url,
            "http://data.local/mqtt/api/v1/device/status"
        );

        let config = resolve(&[("API_BASE_URL", "http://api.local//")]);
        assert_eq!(config.endpoints.status_base.as_deref(), Some("http://api.local"));
        assert_eq!(
            config.endpoints.ready_status_url,
            "http://api.local/mqtt/api/v1/device/status"
        );
    }

    #[test]
    fn test_simulation_flag() {
        assert!(resolve(&[("GPIO_SIMULATION", "TRUE")]).simulation.enabled);
        assert!(resolve(&[("GPIO_SIMULATION", "yes")]).simulation.enabled);

        let config = resolve(&[("GPIO_SIMULATION", "0")]);
        assert!(!config.simulation.enabled);
        assert_eq!(config.simulation.raw_flag.as_deref(), Some("0"));
    }

    #[test]
    fn test_simulation_fallbacks() {
        let config = resolve(&[
            ("TEST_GAS_ID", " abcde "),
            ("TEST_TEST_ID", " t-01 "),
            ("TEST_PROFILE_ID", "7"),
        ]);
        assert_eq!(config.simulation.fallback.gas_id, "ABCDE");
        assert_eq!(config.simulation.fallback.test_id, "t-01");
        assert_eq!(config.simulation.fallback.profile_id, 7);

        let config = resolve(&[("TEST_PROFILE_ID", "seven")]);
        assert_eq!(config.simulation.fallback.profile_id, 14);
    }

    #[test]
    fn test_venv_interpreter() {
        let config = resolve(&[("GPIO_VENV", "/opt/venv"), ("PYTHON_BIN", "python3.11")]);
        if cfg!(windows) {
            assert!(config.controller.interpreter.ends_with("Scripts/python.exe"));
        } else {
            assert_eq!(config.controller.interpreter, PathBuf::from("/opt/venv/bin/python"));
        }

        let config = resolve(&[("PYTHON_BIN", "python3.11")]);
        assert_eq!(config.controller.interpreter, PathBuf::from("python3.11"));
    }

    #[test]
    fn test_working_dir_is_entry_parent() {
        let config = resolve(&[("GPIO_CONTROLLER_MAIN", "/srv/gpio/main.py")]);
        assert_eq!(config.controller.working_dir(), Some(Path::new("/srv/gpio")));
    }

    #[test]
    fn test_transport_settings() {
        let config = resolve(&[
            ("MQTT_URL", "mqtt://broker.local:1884"),
            ("DEVICE_ID", "ab123"),
            ("MQTT_RECONNECT_SECS", "5"),
        ]);
        let transport = config.transport().unwrap();
        assert_eq!(transport.host, "broker.local");
        assert_eq!(transport.port, 1884);
        assert_eq!(transport.client_id, "device-AB123");
        assert_eq!(transport.reconnect_interval, 5);
        assert!(transport.clean_session);

        assert_eq!(transport.tls, None);

        let config = resolve(&[("MQTT_URL", "ws://broker.local")]);
        assert!(config.transport().is_err());
    }

    #[test]
    fn test_tls_transport_takes_certificate_paths() {
        let config = resolve(&[
            ("MQTT_URL", "mqtts://broker.local"),
            ("MQTT_CA_CERT", "/etc/relaybee/ca.pem"),
        ]);
        let transport = config.transport().unwrap();
        assert_eq!(transport.port, 8883);
        let tls = transport.tls.unwrap();
        assert_eq!(tls.ca_cert_path.as_deref(), Some("/etc/relaybee/ca.pem"));
        assert!(!tls.has_client_auth());

        let config = resolve(&[("MQTT_CA_CERT", "/etc/relaybee/ca.pem")]);
        assert_eq!(config.transport().unwrap().tls, None);
    }
}
