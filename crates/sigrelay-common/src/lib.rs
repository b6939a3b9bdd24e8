//! Wire types shared by the sigrelay server and its clients.
//!
//! This crate provides:
//! - The JSON signaling envelope and its identity-field helpers ([`envelope`])
//! - Relay-assigned peer identities and their generator ([`identity`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod identity;

pub use envelope::{Action, Envelope, EnvelopeError};
pub use identity::{Identity, IdentityGenerator, RandomIdentityGenerator};
