//! Error types for the parley client.

use std::net::SocketAddr;

use parley_core::NameError;
use thiserror::Error;

/// Client application errors.
///
/// A connect failure is fatal to the client process; everything after a
/// successful connect shuts the session down cooperatively instead of
/// erroring out.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not establish the transport connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The supplied or prompted display name was unusable.
    #[error("invalid display name: {0}")]
    Name(#[from] NameError),

    /// I/O failure during the handshake or on stdin.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_names_the_address() {
        let err = ClientError::Connect {
            addr: "127.0.0.1:5000".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("127.0.0.1:5000"));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn name_error_converts() {
        let err = ClientError::from(NameError::Empty);
        assert!(matches!(err, ClientError::Name(_)));
    }
}
