//! Parley Daemon - member registry and broadcast relay server
//!
//! This crate provides the core infrastructure for the parley daemon:
//! - `registry` - Thread-safe set of active chat members plus the
//!   best-effort broadcast operation that fans messages out to them
//! - `server` - TCP listener that spawns one connection handler per member
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │  (TcpListener)  │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│    Registry     │
//! │  (per member)   │     │ (members + lock)│
//! └─────────────────┘     └───────┬─────────┘
//!                                 │ broadcast
//!                                 ▼
//!                          all other members
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Per-connection failures are contained at the connection boundary

pub mod registry;
pub mod server;
