//! Parley Daemon - chat relay server
//!
//! This binary runs the relay: it accepts TCP connections, handshakes a
//! display name from each, and rebroadcasts every message to all other
//! members.
//!
//! # Usage
//!
//! ```bash
//! # Start the relay (foreground)
//! parleyd start
//!
//! # Start the relay (background/daemonized)
//! parleyd start -d
//!
//! # Stop the relay
//! parleyd stop
//!
//! # Check relay status
//! parleyd status
//!
//! # Bind somewhere else
//! parleyd --host 0.0.0.0 --port 6000 start
//! PARLEY_PORT=6000 parleyd start
//!
//! # Enable debug logging
//! RUST_LOG=parleyd=debug parleyd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parley_core::RelayConfig;
use parleyd::server::{RelayServer, TcpRegistry};

/// Parley daemon - TCP chat relay
#[derive(Parser, Debug)]
#[command(name = "parleyd", version, about)]
struct Args {
    /// Path to a TOML config file (default: <config_dir>/parley/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config file and environment)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to bind (overrides config file and environment)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the relay
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running relay
    Stop,
    /// Show relay status
    Status,
}

/// Resolves the effective config: defaults < file < environment < flags.
fn resolve_config(args: &Args) -> Result<RelayConfig> {
    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(ref host) = args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    Ok(config)
}

/// Returns the directory holding the PID and log files.
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("parley")
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("parleyd.pid")
}

/// Returns the path to the log file used when daemonized.
fn log_file_path() -> PathBuf {
    state_dir().join("parleyd.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file.
fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Checks if the relay is already running.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file - remove it
        remove_pid_file();
    }
    None
}

/// Sends SIGTERM to the relay process.
fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let mut args = Args::parse();

    // Default to 'start' if no subcommand given
    let command = args.command.take().unwrap_or(Command::Start { daemon: false });

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Relay is already running (PID {pid})");
                eprintln!("Use 'parleyd stop' to stop it first.");
                process::exit(1);
            }

            let config = resolve_config(&args)?;

            if daemon {
                // Daemonize before starting the tokio runtime
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping relay (PID {pid})...");
                stop_daemon(pid)?;

                // Wait for the process to exit (up to 5 seconds)
                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Relay stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Relay did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Relay is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Relay is running (PID {pid})");
                if let Ok(config) = resolve_config(&args) {
                    println!("Address: {}:{}", config.host, config.port);
                }
                Ok(())
            } else {
                println!("Relay is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process, sending output to the log file.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

/// Runs the relay (async entry point).
#[tokio::main]
async fn run_daemon(config: RelayConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("parleyd=info".parse()?)
                .add_directive("parley_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Parley relay starting"
    );

    let addr = config.socket_addr()?;

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = Arc::new(TcpRegistry::new());
    let server = RelayServer::bind(addr, registry, cancel_token)
        .with_context(|| format!("Failed to start relay on {addr}"))?;

    server.run().await;

    info!("Parley relay stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
