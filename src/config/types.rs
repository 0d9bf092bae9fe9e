// Teleop configuration types
// Simulation metadata at the top level, transport settings under `network`

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::network::webrtc_runtime::DEFAULT_STUN_SERVER;

/// Object name → attribute names, e.g. `panda_hand: [position, quaternion]`
pub type ObjectAttributes = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(flatten)]
    pub metadata: Metadata,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// What this connector tells the simulation server about itself
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Metadata {
    // Simulation server address, e.g. "tcp://127.0.0.1"
    pub host: String,

    #[serde(deserialize_with = "deserialize_port")]
    pub server_port: u16,

    #[serde(deserialize_with = "deserialize_port")]
    pub client_port: u16,

    pub world_name: String,
    pub simulation_name: String,

    // Data this side writes into the simulation (filled from inbound frames)
    pub send: ObjectAttributes,

    // Data this side reads from the simulation (sent in reply frames)
    pub receive: ObjectAttributes,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            host: "tcp://127.0.0.1".to_string(),
            server_port: 7000,
            client_port: 7200,
            world_name: "world".to_string(),
            simulation_name: "simulation".to_string(),
            send: ObjectAttributes::new(),
            receive: ObjectAttributes::new(),
        }
    }
}

impl Metadata {
    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.host, self.server_port)
    }

    pub fn client_endpoint(&self) -> String {
        format!("{}:{}", self.host, self.client_port)
    }

    /// Metadata request document sent to the simulation server on connect
    pub fn request_meta_data(&self) -> Value {
        json!({
            "meta_data": {
                "world_name": self.world_name,
                "simulation_name": self.simulation_name,
                "time_unit": "s",
                "length_unit": "m",
                "angle_unit": "rad",
                "handedness": "rhs",
                "force_unit": "N",
            },
            "send": self.send,
            "receive": self.receive,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    // STUN server "host:port" ("stun:" prefix allowed); null or "" disables STUN
    pub stun_server: Option<String>,

    // Root of the mailbox directories; defaults to <exe_dir>/../SDP
    pub signaling_dir: Option<PathBuf>,

    // Label of the data channel the offering side creates
    pub channel_label: String,

    // How often the remote mailbox file is polled
    pub poll_interval_ms: u64,

    // Extra log file next to stderr output
    pub debug_log: Option<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            stun_server: Some(DEFAULT_STUN_SERVER.to_string()),
            signaling_dir: None,
            channel_label: "teleop".to_string(),
            poll_interval_ms: 100,
            debug_log: None,
        }
    }
}

impl NetworkConfig {
    /// Configured STUN server, with blank values treated as "none"
    pub fn stun_server(&self) -> Option<String> {
        self.stun_server
            .as_deref()
            .map(str::trim)
            .filter(|server| !server.is_empty())
            .map(str::to_string)
    }
}

/// Ports appear both as numbers and as quoted strings in existing configs
fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(port),
        PortValue::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port {:?}", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_meta_data_layout() {
        let mut metadata = Metadata::default();
        metadata
            .send
            .insert("panda".to_string(), vec!["position".to_string(), "quaternion".to_string()]);

        let request = metadata.request_meta_data();

        assert_eq!(request["meta_data"]["world_name"], "world");
        assert_eq!(request["meta_data"]["angle_unit"], "rad");
        assert_eq!(request["meta_data"]["handedness"], "rhs");
        assert_eq!(request["send"]["panda"][1], "quaternion");
        assert!(request["receive"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_endpoints() {
        let metadata = Metadata::default();
        assert_eq!(metadata.server_endpoint(), "tcp://127.0.0.1:7000");
        assert_eq!(metadata.client_endpoint(), "tcp://127.0.0.1:7200");
    }

    #[test]
    fn test_blank_stun_server_disables_stun() {
        let network = NetworkConfig {
            stun_server: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(network.stun_server(), None);
        assert_eq!(
            NetworkConfig::default().stun_server().as_deref(),
            Some(DEFAULT_STUN_SERVER)
        );
    }
}
