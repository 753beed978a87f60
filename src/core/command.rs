//! Command messages: topic classification and start-payload preparation.
//!
//! Everything here is pure so the dispatcher's decisions can be tested without
//! a broker or a controller process.

use serde_json::{Map, Value};

use crate::config::agent::{SimulationConfig, SimulationFallback};

/// Relative topics that start a measurement. All three are equivalent.
pub const START_TOPICS: [&str; 3] = [
    "measurement/start",
    "command/measure/start",
    "command/measurement/start",
];

pub const STOP_TOPIC: &str = "command/measure/stop";

/// Polling command answered with a status report.
pub const STATUS_TOPIC: &str = "command/status";

/// JSON object carried by a command.
pub type Payload = Map<String, Value>;

/// One received command, alive for a single dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    pub topic: String,
    pub payload: Payload,
}

impl CommandMessage {
    /// Builds a message from raw broker bytes. See [`parse_payload`].
    pub fn from_bytes(topic: impl Into<String>, bytes: &[u8]) -> Self {
        CommandMessage {
            topic: topic.into(),
            payload: parse_payload(bytes),
        }
    }
}

/// Parses a payload as a JSON object.
///
/// Empty input, invalid JSON and JSON that is not an object all yield an empty
/// map; a malformed payload never fails the handler.
pub fn parse_payload(bytes: &[u8]) -> Payload {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => map,
        _ => Payload::new(),
    }
}

/// Strips `prefix` from `topic`; topics outside the namespace are returned
/// unchanged.
pub fn relative_topic<'a>(topic: &'a str, prefix: &str) -> &'a str {
    topic.strip_prefix(prefix).unwrap_or(topic)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Stop,
    Status,
    Other,
}

impl CommandKind {
    pub fn classify(relative: &str) -> Self {
        if START_TOPICS.contains(&relative) {
            CommandKind::Start
        } else if relative == STOP_TOPIC {
            CommandKind::Stop
        } else if relative == STATUS_TOPIC {
            CommandKind::Status
        } else {
            CommandKind::Other
        }
    }
}

/// Whether the payload asks for simulation.
///
/// Looks at `simulation`, or at `test` when `simulation` is absent or null,
/// and accepts `true`, `1`, `"1"`, `"true"` and `"yes"`.
pub fn payload_requests_simulation(payload: &Payload) -> bool {
    let indicator = match payload.get("simulation") {
        Some(value) if !value.is_null() => Some(value),
        _ => payload.get("test"),
    };
    indicator.is_some_and(is_simulation_value)
}

fn is_simulation_value(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

/// The payload can only switch simulation on; it cannot switch off a flag
/// set by the environment.
pub fn simulation_active(env_enabled: bool, payload: &Payload) -> bool {
    env_enabled || payload_requests_simulation(payload)
}

/// Fills `gas_id`, `test_id` and `profile_id` when absent or null.
///
/// Present values are kept even when falsy, so `"gas_id": ""` survives.
pub fn fill_simulation_defaults(mut payload: Payload, fallback: &SimulationFallback) -> Payload {
    let defaults = [
        ("gas_id", Value::from(fallback.gas_id.clone())),
        ("test_id", Value::from(fallback.test_id.clone())),
        ("profile_id", Value::from(fallback.profile_id)),
    ];
    for (key, default) in defaults {
        if payload.get(key).map_or(true, Value::is_null) {
            payload.insert(key.to_string(), default);
        }
    }
    payload
}

/// Payload forwarded to the controller for a start command, and whether
/// simulation mode applied.
pub fn prepare_start_payload(payload: Payload, simulation: &SimulationConfig) -> (Payload, bool) {
    if simulation_active(simulation.enabled, &payload) {
        (fill_simulation_defaults(payload, &simulation.fallback), true)
    } else {
        (payload, false)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn simulation(enabled: bool) -> SimulationConfig {
        SimulationConfig {
            enabled,
            raw_flag: None,
            fallback: SimulationFallback {
                gas_id: "FFFFF".into(),
                test_id: "00000".into(),
                profile_id: 14,
            },
        }
    }

    #[test]
    fn test_parse_payload_never_fails() {
        assert!(parse_payload(b"").is_empty());
        assert!(parse_payload(b"not json").is_empty());
        assert!(parse_payload(b"[1, 2]").is_empty());
        assert!(parse_payload(b"42").is_empty());
        assert_eq!(parse_payload(br#"{"gas_id":"AB123"}"#)["gas_id"], "AB123");
    }

    #[test]
    fn test_relative_topic() {
        let prefix = "device/AB123/";
        for suffix in ["measurement/start", "command/status", "a/b/c", ""] {
            let topic = format!("{prefix}{suffix}");
            assert_eq!(relative_topic(&topic, prefix), suffix);
        }
        assert_eq!(
            relative_topic("device/ZZZZZ/measurement/start", prefix),
            "device/ZZZZZ/measurement/start"
        );
        assert_eq!(relative_topic("broadcast", prefix), "broadcast");
    }

    #[test]
    fn test_classify() {
        for topic in START_TOPICS {
            assert_eq!(CommandKind::classify(topic), CommandKind::Start);
        }
        assert_eq!(CommandKind::classify("command/measure/stop"), CommandKind::Stop);
        assert_eq!(CommandKind::classify("command/status"), CommandKind::Status);
        assert_eq!(CommandKind::classify("measurement/stop"), CommandKind::Other);
        assert_eq!(CommandKind::classify("Measurement/Start"), CommandKind::Other);
    }

    #[test]
    fn test_payload_simulation_values() {
        for value in [json!(true), json!(1), json!(1.0), json!("1"), json!("true"), json!("yes")] {
            assert!(
                payload_requests_simulation(&object(json!({ "simulation": value.clone() }))),
                "{value}"
            );
            assert!(
                payload_requests_simulation(&object(json!({ "test": value.clone() }))),
                "{value}"
            );
        }
        for value in [json!(false), json!(0), json!(2), json!("TRUE"), json!("on"), json!([])] {
            assert!(
                !payload_requests_simulation(&object(json!({ "simulation": value.clone() }))),
                "{value}"
            );
        }
        assert!(!payload_requests_simulation(&Payload::new()));
    }

    #[test]
    fn test_simulation_key_shadows_test_key() {
        let payload = object(json!({ "simulation": false, "test": true }));
        assert!(!payload_requests_simulation(&payload));

        let payload = object(json!({ "simulation": null, "test": true }));
        assert!(payload_requests_simulation(&payload));
    }

    #[test]
    fn test_environment_flag_cannot_be_suppressed() {
        let payload = object(json!({ "simulation": false }));
        assert!(simulation_active(true, &payload));
        assert!(!simulation_active(false, &payload));
    }

    #[test]
    fn test_empty_payload_with_forced_simulation_gets_all_fallbacks() {
        let (forwarded, simulated) = prepare_start_payload(Payload::new(), &simulation(true));
        assert!(simulated);
        assert_eq!(
            Value::Object(forwarded),
            json!({ "gas_id": "FFFFF", "test_id": "00000", "profile_id": 14 })
        );
    }

    #[test]
    fn test_present_fields_are_never_overridden() {
        let payload = object(json!({ "gas_id": "", "test_id": "T-9", "profile_id": 0 }));
        let (forwarded, _) = prepare_start_payload(payload.clone(), &simulation(true));
        assert_eq!(forwarded, payload);
    }

    #[test]
    fn test_null_fields_are_filled() {
        let payload = object(json!({ "gas_id": null, "extra": 1 }));
        let (forwarded, _) = prepare_start_payload(payload, &simulation(true));
        assert_eq!(forwarded["gas_id"], "FFFFF");
        assert_eq!(forwarded["extra"], 1);
    }

    #[test]
    fn test_payload_untouched_without_simulation() {
        let payload = object(json!({ "test_id": "T-1" }));
        let (forwarded, simulated) = prepare_start_payload(payload.clone(), &simulation(false));
        assert!(!simulated);
        assert_eq!(forwarded, payload);
    }

    #[test]
    fn test_payload_can_enable_simulation() {
        let payload = object(json!({ "test": "yes" }));
        let (forwarded, simulated) = prepare_start_payload(payload, &simulation(false));
        assert!(simulated);
        assert_eq!(forwarded["gas_id"], "FFFFF");
    }
}
