//! Client session: connect, handshake, then relay between stdin and server.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::{MemberName, MAX_FRAME_BYTES};

use crate::error::ClientError;

/// Settings for one client session.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Relay address to connect to.
    pub addr: SocketAddr,

    /// Display name. When `None`, the user is prompted on startup.
    pub name: Option<String>,
}

/// What to do with one line of stdin input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InputAction {
    /// Forward a formatted chat message to the relay.
    Send(String),
    /// Leave the chat gracefully.
    Quit,
    /// Blank line; nothing to do.
    Ignore,
}

/// Classifies a raw stdin line.
///
/// `/quit` (any case) leaves the chat; anything else non-empty is sent
/// prefixed with the member's name, the way other members expect to see it.
fn classify_input(name: &MemberName, line: &str) -> InputAction {
    let text = line.trim();
    if text.is_empty() {
        return InputAction::Ignore;
    }
    if text.eq_ignore_ascii_case("/quit") {
        return InputAction::Quit;
    }
    InputAction::Send(format!("{name}: {text}"))
}

/// Runs a client session to completion.
///
/// Connects, handshakes, then multiplexes server output and stdin input
/// until the user quits, stdin closes, Ctrl-C arrives, or the server side
/// goes away. All shutdown paths cancel the shared token so the receive
/// task and the input loop stop together.
///
/// # Errors
///
/// - `ClientError::Connect` if the relay is unreachable (fatal)
/// - `ClientError::Name` if no usable display name could be obtained
pub async fn run(options: ClientOptions) -> Result<(), ClientError> {
    let stream = TcpStream::connect(options.addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: options.addr,
            source,
        })?;

    info!(addr = %options.addr, "Connected to chat server");

    let (reader, mut writer) = stream.into_split();

    let name = match options.name {
        Some(raw) => MemberName::parse(&raw)?,
        None => prompt_for_name().await?,
    };

    // The very first write is the handshake: the raw display name.
    writer.write_all(name.as_str().as_bytes()).await?;
    writer.flush().await?;
    info!(member = %name, "Joined the chat");

    let cancel_token = CancellationToken::new();
    let receive_task = spawn_receive_task(reader, cancel_token.clone());

    run_input_loop(&name, &mut writer, &cancel_token).await;

    cancel_token.cancel();
    if let Err(error) = writer.shutdown().await {
        debug!(%error, "Connection already closed");
    }
    let _ = receive_task.await;

    Ok(())
}

/// Prompts on stdout and reads display names from stdin until one parses.
async fn prompt_for_name() -> Result<MemberName, ClientError> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        write_stdout(b"Enter your name: ").await?;
        line.clear();
        let bytes_read = stdin.read_line(&mut line).await?;
        if bytes_read == 0 {
            // stdin closed before a name was given
            return Err(parley_core::NameError::Empty.into());
        }
        match MemberName::parse(&line) {
            Ok(name) => return Ok(name),
            Err(error) => warn!(%error, "Try again"),
        }
    }
}

/// Spawns the task that prints server chunks to stdout.
///
/// Server-side disconnection cancels the shared token instead of exiting
/// the process, so the input loop winds down with it.
fn spawn_receive_task(
    mut reader: OwnedReadHalf,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_FRAME_BYTES];
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,

                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        info!("Server closed the connection");
                        cancel_token.cancel();
                        break;
                    }
                    Ok(n) => {
                        if let Err(error) = print_chunk(&buf[..n]).await {
                            warn!(%error, "Failed to write to stdout");
                            cancel_token.cancel();
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(%error, "Connection lost to server");
                        cancel_token.cancel();
                        break;
                    }
                }
            }
        }
    })
}

/// Reads stdin lines and forwards them until the session ends.
///
/// Every exit path is graceful: `/quit`, stdin EOF, and Ctrl-C all send the
/// quit sentinel so the relay announces the departure; a failed send means
/// the server is already gone and the loop just stops.
async fn run_input_loop(
    name: &MemberName,
    writer: &mut OwnedWriteHalf,
    cancel_token: &CancellationToken,
) {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            _ = cancel_token.cancelled() => return,

            result = stdin.read_line(&mut line) => {
                match result {
                    Ok(0) => {
                        // stdin EOF takes the same path as /quit
                        send_quit(name, writer).await;
                        return;
                    }
                    Ok(_) => match classify_input(name, &line) {
                        InputAction::Ignore => {}
                        InputAction::Quit => {
                            send_quit(name, writer).await;
                            return;
                        }
                        InputAction::Send(message) => {
                            if let Err(error) = send_payload(writer, message.as_bytes()).await {
                                warn!(%error, "Unable to send, server disconnected");
                                return;
                            }
                        }
                    },
                    Err(error) => {
                        warn!(%error, "Failed to read stdin");
                        return;
                    }
                }
            }

            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(%error, "Ctrl-C handler failed");
                }
                send_quit(name, writer).await;
                return;
            }
        }
    }
}

/// Sends the quit sentinel, best effort, so the relay can announce the
/// departure as a graceful leave.
async fn send_quit(name: &MemberName, writer: &mut OwnedWriteHalf) {
    info!("Leaving the chat");
    if let Err(error) = send_payload(writer, name.quit_token().as_bytes()).await {
        debug!(%error, "Server already gone, skipping quit notice");
    }
}

async fn send_payload(writer: &mut OwnedWriteHalf, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Prints one server chunk followed by a newline.
async fn print_chunk(chunk: &[u8]) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(chunk).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stdout(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(bytes).await?;
    stdout.flush().await
}
