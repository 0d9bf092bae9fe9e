// Configuration module for the teleop connectors
// Loads simulation metadata and transport settings from YAML or TOML

pub mod loader;
pub mod types;

pub use loader::{load_config, ConfigError};
pub use types::{Config, Metadata, NetworkConfig, ObjectAttributes};
