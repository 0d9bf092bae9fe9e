// Log setup for the teleop binaries
// stderr always; a plain-text copy goes to `network.debug_log` when configured

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default `info` level. Returns false when a
/// subscriber was already installed; that one is kept.
pub fn init(debug_log: Option<&Path>) -> io::Result<bool> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match debug_log {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            writeln!(file, "=== teleop debug log ===")?;
            writeln!(file, "Session started: {:?}", SystemTime::now())?;
            writeln!(file, "To monitor: tail -f {}", path.display())?;

            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .try_init();
    match installed {
        Ok(()) => Ok(true),
        Err(e) => {
            match debug_log {
                Some(path) => warn!(
                    "Subscriber already installed, {} only has its header: {}",
                    path.display(),
                    e
                ),
                None => debug!("Subscriber already installed, keeping it: {}", e),
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_keeps_first_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.log");
        let second = dir.path().join("second.log");

        init(Some(&first)).unwrap();
        assert!(!init(Some(&second)).unwrap());

        let header = std::fs::read_to_string(&second).unwrap();
        assert!(header.starts_with("=== teleop debug log ==="));
    }
}
