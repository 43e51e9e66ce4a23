//! TCP server for the parley daemon.
//!
//! The server:
//! - Binds a TCP listener with address reuse enabled, so the port can be
//!   rebound promptly after a restart
//! - Accepts connections until the cancellation token fires
//! - Spawns a `ConnectionHandler` task per connection
//!
//! Accept failures are logged and the loop continues; no failure in one
//! connection ever terminates the server or another connection's task.

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, MemberWriter, TcpRegistry};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Listen backlog for the relay socket.
const LISTEN_BACKLOG: u32 = 1024;

/// TCP relay server.
///
/// Owns the listener and the shared member registry; connection handlers
/// receive a clone of the registry handle and nothing else.
pub struct RelayServer {
    listener: tokio::net::TcpListener,
    registry: Arc<TcpRegistry>,
    cancel_token: CancellationToken,
    connection_counter: AtomicU64,
}

impl RelayServer {
    /// Binds the relay socket.
    ///
    /// Address reuse is enabled before binding. Binding port 0 selects an
    /// ephemeral port; use [`local_addr`](Self::local_addr) to discover it.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the socket cannot be created, configured,
    ///   bound, or put into listening mode
    pub fn bind(
        addr: SocketAddr,
        registry: Arc<TcpRegistry>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let bind_err = |source: std::io::Error| ServerError::Bind { addr, source };

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

        Ok(Self {
            listener,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Returns when the cancellation token fires. Accept errors are
    /// transient: they are logged and the loop continues.
    pub async fn run(&self) {
        match self.local_addr() {
            Ok(addr) => info!(%addr, "Relay server listening"),
            Err(_) => info!("Relay server listening"),
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let member_id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, member_id);
                        }
                        Err(error) => {
                            error!(%error, "Failed to accept connection");
                            // Keep accepting; one bad accept is never fatal.
                        }
                    }
                }
            }
        }
    }

    /// Spawns the handler task for a freshly accepted connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, member_id: u64) {
        let (reader, writer) = stream.into_split();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            ConnectionHandler::new(reader, writer, registry, member_id, peer)
                .run()
                .await;
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The relay socket could not be set up.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_ephemeral_port_reports_local_addr() {
        let registry = Arc::new(TcpRegistry::new());
        let server = RelayServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            registry,
            CancellationToken::new(),
        )
        .unwrap();

        let addr = server.local_addr().unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn bind_error_names_the_address() {
        // Port 1 is privileged; binding it as a normal user fails.
        let registry = Arc::new(TcpRegistry::new());
        let result = RelayServer::bind(
            "127.0.0.1:1".parse().unwrap(),
            registry,
            CancellationToken::new(),
        );

        if let Err(err) = result {
            assert!(err.to_string().contains("127.0.0.1:1"));
        }
    }
}
