// Command line handling shared by teleop-server and teleop-client

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;

use crate::config::load_config;
use crate::connector::{Connector, ConnectorOptions, Role};
use crate::logging;
use crate::network::{Str0mTransport, TransportOptions};
use crate::shutdown::ShutdownToken;
use crate::signaling::Mailbox;
use crate::sim::StandaloneSimulation;

pub const DEFAULT_CLIENT_ID: &str = "client_1";

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub client_id: String,
    pub config: PathBuf,
}

/// Parse `[client_id] [config]`; `None` means help was requested
pub fn parse_args(args: &[String], default_config: &str) -> anyhow::Result<Option<Args>> {
    let rest = args.get(1..).unwrap_or_default();
    if rest.iter().any(|arg| arg == "-h" || arg == "--help") {
        return Ok(None);
    }
    if rest.len() > 2 {
        bail!("expected at most 2 arguments, got {}", rest.len());
    }
    if let Some(flag) = rest.iter().find(|arg| arg.starts_with('-')) {
        bail!("unknown option: {}", flag);
    }

    Ok(Some(Args {
        client_id: rest
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
        config: PathBuf::from(rest.get(1).map_or(default_config, String::as_str)),
    }))
}

pub fn print_usage(program: &str, role: Role, default_config: &str) {
    println!("teleop {} - simulation bridge over a WebRTC data channel", role.name);
    println!();
    println!("Usage:");
    println!("  {} [client_id] [config]", program);
    println!();
    println!("Defaults:");
    println!("  client_id  {}", DEFAULT_CLIENT_ID);
    println!("  config     {}", default_config);
    println!();
    println!("Relative config paths are looked up in <exe_dir>/../configuration.");
    println!("Signaling files live in <exe_dir>/../SDP/<client_id> unless");
    println!("network.signaling_dir says otherwise.");
}

/// Directory holding the running executable
pub fn resolve_exe_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate the running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("executable has no parent directory")
}

/// Absolute paths are kept; relative ones live in `<exe_dir>/../configuration`
pub fn resolve_config_path(exe_dir: &Path, config: &Path) -> PathBuf {
    if config.is_absolute() {
        return config.to_path_buf();
    }
    normalize(&exe_dir.join("..").join("configuration").join(config))
}

pub fn default_signaling_root(exe_dir: &Path) -> PathBuf {
    normalize(&exe_dir.join("..").join("SDP"))
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Entry point of both connector binaries
pub fn run_role(role: Role, default_config: &str) -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("teleop", String::as_str);
    let Some(args) = parse_args(&args, default_config)? else {
        print_usage(program, role, default_config);
        return Ok(());
    };

    let exe_dir = resolve_exe_dir()?;
    let config_path = resolve_config_path(&exe_dir, &args.config);
    let config = load_config(&config_path)?;
    logging::init(config.network.debug_log.as_deref()).context("cannot open debug log")?;
    info!("Configuration loaded from {}", config_path.display());

    let shutdown = ShutdownToken::new();
    shutdown
        .cancel_on_ctrl_c()
        .context("cannot install Ctrl+C handler")?;

    let root = config
        .network
        .signaling_dir
        .clone()
        .unwrap_or_else(|| default_signaling_root(&exe_dir));
    let mailbox = Mailbox::new(&root, &args.client_id);

    let sim = StandaloneSimulation::new(&config.metadata)?;
    let (transport, events) = Str0mTransport::start(TransportOptions {
        stun_server: config.network.stun_server(),
    })?;

    let options = ConnectorOptions {
        channel_label: config.network.channel_label.clone(),
        poll_interval: Duration::from_millis(config.network.poll_interval_ms.max(1)),
    };
    let mut connector = Connector::new(
        &args.client_id,
        role,
        mailbox,
        transport,
        events,
        sim,
        options,
    );
    connector.run(&shutdown)?;

    info!("[{}] Done", args.client_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_without_arguments() {
        let parsed = parse_args(&args(&["teleop-server"]), "server_meta_data.yaml")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.client_id, "client_1");
        assert_eq!(parsed.config, PathBuf::from("server_meta_data.yaml"));
    }

    #[test]
    fn test_positional_arguments() {
        let parsed = parse_args(&args(&["teleop-client", "arm_7", "/etc/teleop.toml"]), "x.yaml")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.client_id, "arm_7");
        assert_eq!(parsed.config, PathBuf::from("/etc/teleop.toml"));
    }

    #[test]
    fn test_help_and_bad_arguments() {
        assert_eq!(parse_args(&args(&["p", "--help"]), "x.yaml").unwrap(), None);
        assert_eq!(parse_args(&args(&["p", "a", "-h"]), "x.yaml").unwrap(), None);
        assert!(parse_args(&args(&["p", "a", "b", "c"]), "x.yaml").is_err());
        assert!(parse_args(&args(&["p", "--debug"]), "x.yaml").is_err());
    }

    #[test]
    fn test_relative_config_resolves_next_to_bin_dir() {
        let exe_dir = Path::new("/opt/teleop/bin");
        assert_eq!(
            resolve_config_path(exe_dir, Path::new("server_meta_data.yaml")),
            PathBuf::from("/opt/teleop/configuration/server_meta_data.yaml")
        );
        assert_eq!(
            resolve_config_path(exe_dir, Path::new("/tmp/c.yaml")),
            PathBuf::from("/tmp/c.yaml")
        );
        assert_eq!(default_signaling_root(exe_dir), PathBuf::from("/opt/teleop/SDP"));
    }
}
