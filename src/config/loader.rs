// Configuration file loading
// YAML by default, TOML when the file ends in .toml

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::types::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load the configuration at `path`
///
/// Every field is optional; an empty file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded config file {}", path.display());

    if contents.trim().is_empty() {
        return Ok(Config::default());
    }

    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_yaml_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "server_meta_data.yaml",
            r#"
world_name: lab
simulation_name: teleop_server
host: tcp://10.0.0.2
server_port: "7000"
client_port: 7501
send:
  panda_hand:
    - position
    - quaternion
receive:
  panda_joint1: [joint_rvalue]
  panda_joint2: [joint_rvalue]
"#,
        );

        let config = load_config(&path).unwrap();
        let metadata = &config.metadata;

        assert_eq!(metadata.world_name, "lab");
        assert_eq!(metadata.simulation_name, "teleop_server");
        assert_eq!(metadata.host, "tcp://10.0.0.2");
        assert_eq!(metadata.server_port, 7000);
        assert_eq!(metadata.client_port, 7501);
        assert_eq!(metadata.send["panda_hand"], vec!["position", "quaternion"]);
        assert_eq!(metadata.receive.len(), 2);
        assert_eq!(config.network, Default::default());
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "client.yaml",
            "simulation_name: remote\nnetwork:\n  stun_server: null\n  poll_interval_ms: 20\n",
        );

        let config = load_config(&path).unwrap();

        // Custom values
        assert_eq!(config.metadata.simulation_name, "remote");
        assert_eq!(config.network.stun_server, None);
        assert_eq!(config.network.poll_interval_ms, 20);

        // Default values should still be there
        assert_eq!(config.metadata.world_name, "world");
        assert_eq!(config.metadata.server_port, 7000);
        assert_eq!(config.network.channel_label, "teleop");
    }

    #[test]
    fn test_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "client.toml",
            r#"
world_name = "lab"
client_port = "7300"

[receive]
cube = ["position"]

[network]
channel_label = "arm"
"#,
        );

        let config = load_config(&path).unwrap();
        assert_eq!(config.metadata.world_name, "lab");
        assert_eq!(config.metadata.client_port, 7300);
        assert_eq!(config.metadata.receive["cube"], vec!["position"]);
        assert_eq!(config.network.channel_label, "arm");
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.yaml", "\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.metadata, Default::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_bad_port_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.yaml", "server_port: seven\n");
        assert!(matches!(load_config(&path), Err(ConfigError::Yaml { .. })));
    }
}
