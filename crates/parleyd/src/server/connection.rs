//! Connection handler for individual chat members.
//!
//! Each accepted connection gets its own `ConnectionHandler` that:
//! - Performs the name handshake (first chunk received is the display name)
//! - Announces the join to everyone already present
//! - Registers the member, then relays every chunk it reads
//! - Detects quit/disconnect and deregisters exactly once
//!
//! The post-handshake lifecycle is an explicit state machine:
//!
//! ```text
//! ACTIVE ──quit sentinel / peer closed──▶ LEAVING (graceful, announced)
//! ACTIVE ──read error──────────────────▶ LEAVING (abrupt, silent)
//! LEAVING ──deregister + close─────────▶ CLOSED (terminal)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy: connection errors are logged
//! and result in cleanup, never in a panic or in another task's failure.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use parley_core::{MemberName, NameError, MAX_FRAME_BYTES};

use crate::registry::{MemberId, Registry};

/// Shared write half of a member's connection.
///
/// Shared between the member's own handler and the registry broadcaster.
pub type MemberWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Registry instantiation used by the TCP server.
pub type TcpRegistry = Registry<OwnedWriteHalf>;

/// Lifecycle of a handler after a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    /// Reading and relaying messages.
    Active,
    /// Departure detected; announcement and cleanup pending.
    Leaving(LeaveCause),
    /// Terminal. No further reads occur.
    Closed,
}

/// Why a member is leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveCause {
    /// Quit sentinel or orderly peer close. Announced to the others.
    Graceful,
    /// Read error (reset, broken pipe). Logged only, never announced.
    Abrupt,
}

/// Connection handler for a single member.
pub struct ConnectionHandler {
    reader: OwnedReadHalf,
    writer: MemberWriter,
    registry: Arc<TcpRegistry>,
    member_id: MemberId,
    peer: SocketAddr,
}

impl ConnectionHandler {
    /// Creates a handler for a freshly accepted connection.
    ///
    /// `member_id` is the connection counter value assigned by the server;
    /// it becomes the member's registry identity.
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        registry: Arc<TcpRegistry>,
        member_id: MemberId,
        peer: SocketAddr,
    ) -> Self {
        Self {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            registry,
            member_id,
            peer,
        }
    }

    /// Runs the handler to completion.
    ///
    /// Performs the handshake, announces and registers the member, then
    /// relays messages until departure. All failures are contained here;
    /// this method never returns an error to the accept loop.
    pub async fn run(mut self) {
        debug!(id = self.member_id, peer = %self.peer, "New connection");

        let name = match self.handshake().await {
            Ok(name) => name,
            Err(error) => {
                warn!(id = self.member_id, peer = %self.peer, %error, "Handshake failed");
                self.close().await;
                return;
            }
        };

        // Announce before registering: the joiner is excluded as the
        // sender and is not yet a broadcast target, so only pre-existing
        // members see the announcement.
        self.registry
            .broadcast(self.member_id, name.join_announcement().as_bytes())
            .await;

        if let Err(error) = self
            .registry
            .add(self.member_id, name.clone(), Arc::clone(&self.writer))
            .await
        {
            // Ids come from an atomic counter, so this is a logic error,
            // not a recoverable condition.
            error!(id = self.member_id, %error, "Registry invariant violated, dropping connection");
            self.close().await;
            return;
        }

        info!(member = %name, id = self.member_id, peer = %self.peer, "Member joined");

        let mut state = HandlerState::Active;
        let mut buf = vec![0u8; MAX_FRAME_BYTES];

        while state == HandlerState::Active {
            let read_result = self.reader.read(&mut buf).await;
            state = match read_result {
                Ok(0) => HandlerState::Leaving(LeaveCause::Graceful),
                Ok(n) => self.on_payload(&name, &buf[..n]).await,
                Err(error) => {
                    warn!(member = %name, id = self.member_id, %error, "Member disconnected abruptly");
                    HandlerState::Leaving(LeaveCause::Abrupt)
                }
            };
        }

        let id = self.member_id;
        if let HandlerState::Leaving(cause) = state {
            state = self.leave(&name, cause).await;
        }
        debug!(id, ?state, "Handler finished");
    }

    /// Reads the first chunk and interprets it as the display name.
    async fn handshake(&mut self) -> Result<MemberName, ConnectionError> {
        let mut buf = vec![0u8; MAX_FRAME_BYTES];
        let n = self.reader.read(&mut buf).await?;
        if n == 0 {
            return Err(ConnectionError::ClosedDuringHandshake);
        }
        let raw = String::from_utf8_lossy(&buf[..n]);
        Ok(MemberName::parse(&raw)?)
    }

    /// Classifies one received chunk and relays it when it is ordinary chat.
    ///
    /// The quit check interprets the bytes as (lossy) UTF-8; the relayed
    /// payload is the raw bytes exactly as read.
    async fn on_payload(&self, name: &MemberName, payload: &[u8]) -> HandlerState {
        let text = String::from_utf8_lossy(payload);
        if text.trim().is_empty() || name.is_quit(&text) {
            return HandlerState::Leaving(LeaveCause::Graceful);
        }

        self.registry.broadcast(self.member_id, payload).await;
        HandlerState::Active
    }

    /// Runs the LEAVING state: announce (graceful only), deregister, close.
    ///
    /// Removal is idempotent, so racing a broadcast eviction is harmless.
    /// Returns the terminal state; no further reads occur after this.
    async fn leave(self, name: &MemberName, cause: LeaveCause) -> HandlerState {
        if cause == LeaveCause::Graceful {
            self.registry
                .broadcast(self.member_id, name.leave_announcement().as_bytes())
                .await;
            info!(member = %name, id = self.member_id, "Member left the chat");
        }

        self.registry.remove(self.member_id).await;
        self.close().await;
        HandlerState::Closed
    }

    /// Shuts down the write half, best effort.
    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(error) = writer.shutdown().await {
            debug!(id = self.member_id, %error, "Connection already closed");
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The peer closed the connection before sending a name.
    #[error("connection closed before handshake")]
    ClosedDuringHandshake,

    /// The handshake payload did not contain a usable name.
    #[error("invalid display name: {0}")]
    InvalidName(#[from] NameError),

    /// I/O failure while reading the handshake.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_display() {
        let err = ConnectionError::ClosedDuringHandshake;
        assert_eq!(err.to_string(), "connection closed before handshake");

        let err = ConnectionError::InvalidName(NameError::Empty);
        assert!(err.to_string().contains("display name"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = ConnectionError::from(io);
        assert!(matches!(err, ConnectionError::Io(_)));
        assert!(err.to_string().contains("reset"));
    }
}
