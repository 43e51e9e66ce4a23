//! Parley chat client library.
//!
//! Connects to a relay daemon, performs the name handshake, then runs two
//! cooperating activities: a receive task printing server chunks to stdout
//! and an input loop forwarding stdin lines to the relay. Both are joined
//! by a cancellation token so either side's shutdown stops the other
//! cleanly; the client never tears the process down from inside a task.

pub mod client;
pub mod error;

pub use client::{run, ClientOptions};
pub use error::ClientError;
