// Mailbox relay
// Ferries offer.txt / answer.txt between two machines over a WebSocket
//
// Usage:
//   mailbox-relay serve [client_id] [--bind 0.0.0.0:7575] [--dir DIR]
//   mailbox-relay connect <ws://host:port> [client_id] [--dir DIR]

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tracing::info;

use teleop_rtc::cli::{default_signaling_root, resolve_exe_dir, DEFAULT_CLIENT_ID};
use teleop_rtc::logging;
use teleop_rtc::signaling::relay::{self, DEFAULT_BIND};
use teleop_rtc::signaling::Mailbox;

#[derive(Debug)]
enum Mode {
    Serve { bind: String },
    Connect { url: String },
}

#[derive(Debug)]
struct Options {
    mode: Mode,
    client_id: String,
    dir: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> anyhow::Result<Option<Options>> {
    let mut rest = args.iter().skip(1);
    let mode = match rest.next().map(String::as_str) {
        Some("serve") => "serve",
        Some("connect") => "connect",
        Some("--help") | Some("-h") | None => return Ok(None),
        Some(other) => bail!("unknown command: {}", other),
    };

    let mut positional = Vec::new();
    let mut bind = DEFAULT_BIND.to_string();
    let mut dir = None;
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--bind" => bind = rest.next().context("--bind requires an address")?.clone(),
            "--dir" => dir = Some(PathBuf::from(rest.next().context("--dir requires a path")?)),
            "--help" | "-h" => return Ok(None),
            flag if flag.starts_with('-') => bail!("unknown option: {}", flag),
            value => positional.push(value.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    let mode = if mode == "serve" {
        Mode::Serve { bind }
    } else {
        let url = positional.next().context("connect requires a relay URL")?;
        Mode::Connect { url }
    };
    let client_id = positional
        .next()
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
    if let Some(extra) = positional.next() {
        bail!("unexpected argument: {}", extra);
    }

    Ok(Some(Options {
        mode,
        client_id,
        dir,
    }))
}

fn print_usage(program: &str) {
    println!("Mailbox relay - carries offer/answer files over a WebSocket");
    println!();
    println!("Usage:");
    println!(
        "  {} serve [client_id] [--bind ADDR] [--dir DIR]      # offer side",
        program
    );
    println!(
        "  {} connect <url> [client_id] [--dir DIR]            # answer side",
        program
    );
    println!();
    println!("Defaults: client_id {}, bind {}", DEFAULT_CLIENT_ID, DEFAULT_BIND);
    println!("          dir <exe_dir>/../SDP");
}

async fn run(options: Options) -> anyhow::Result<()> {
    let root = match options.dir {
        Some(dir) => dir,
        None => default_signaling_root(&resolve_exe_dir()?),
    };
    let mailbox = Mailbox::new(&root, &options.client_id);

    match options.mode {
        Mode::Serve { bind } => {
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("cannot listen on {}", bind))?;
            relay::serve(listener, &mailbox, &options.client_id).await
        }
        Mode::Connect { url } => relay::connect(&url, &mailbox, &options.client_id).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(None)?;

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("mailbox-relay", String::as_str);
    let Some(options) = parse_args(&args)? else {
        print_usage(program);
        return Ok(());
    };

    tokio::select! {
        result = run(options) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl+C received, relay stopped");
            Ok(())
        }
    }
}
