//! Parley Core - Shared types for the chat relay
//!
//! This crate provides the domain types shared between the relay daemon
//! (parleyd) and the chat client (parley):
//! - member names and the announcements/quit sentinel derived from them
//! - the layered relay configuration
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, or `todo!()` in production paths.

pub mod config;
pub mod name;

// Re-exports for convenience
pub use config::{ConfigError, RelayConfig};
pub use name::{MemberName, NameError};

/// Largest chunk read from a connection in a single call.
///
/// The relay performs no framing: one read is one logical message, so this
/// is also the practical upper bound on a single message. Longer messages
/// are split across reads and rebroadcast as independent chunks.
pub const MAX_FRAME_BYTES: usize = 1024;
