//! Parley - chat client for the relay daemon
//!
//! Connects to a running relay, prompts for a display name (unless one is
//! given with `--name`), and then alternates between printing server output
//! and forwarding stdin lines. Type `/quit` to leave gracefully.
//!
//! # Usage
//!
//! ```bash
//! # Connect with the configured defaults (127.0.0.1:5000)
//! parley
//!
//! # Connect elsewhere, skipping the name prompt
//! parley --host chat.example.com --port 6000 --name Alice
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_cli::{run, ClientOptions};
use parley_core::RelayConfig;

/// Parley - TCP chat client
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
struct Args {
    /// Path to a TOML config file (default: <config_dir>/parley/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Relay host (overrides config file and environment)
    #[arg(long)]
    host: Option<String>,

    /// Relay port (overrides config file and environment)
    #[arg(long)]
    port: Option<u16>,

    /// Display name; prompted interactively when omitted
    #[arg(long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Chat output goes to stdout; keep logs on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parley=info".parse()?)
                .add_directive("parley_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let addr = config.socket_addr()?;

    run(ClientOptions {
        addr,
        name: args.name,
    })
    .await
    .with_context(|| format!("Chat session against {addr} failed"))?;

    Ok(())
}
