//! sigrelay: WebSocket signaling relay for peer-to-peer session negotiation.
//!
//! Clients send `start` to get an identity, then exchange offers, answers
//! and candidates with peers by naming the peer's identity in
//! `data.remoteId`. The relay rewrites that field and forwards the message;
//! it never looks at the rest of the payload.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Error types for relay server operations.
pub mod error;
pub mod metrics;
/// Identity → channel table.
pub mod registry;
pub mod router;
/// Accept loop and shared server state.
pub mod server;

pub use server::{run, run_with_shutdown, ServerState};
