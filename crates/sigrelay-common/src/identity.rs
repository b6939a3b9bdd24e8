//! Relay-assigned peer identities.
//!
//! An [`Identity`] is minted by the relay when a channel sends `start` and
//! names that channel as a routing destination until it disconnects.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// URL-safe alphabet identities are drawn from. 64 symbols, so masking a
/// random byte with `0x3f` picks one uniformly.
pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Default identity length: 21 symbols, 126 bits of entropy.
pub const DEFAULT_LENGTH: usize = 21;
/// Shortest identity length accepted by configuration.
pub const MIN_LENGTH: usize = 8;
/// Longest identity length accepted by configuration.
pub const MAX_LENGTH: usize = 64;

/// Opaque token naming a registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Borrow the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Identity {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Source of fresh identities.
///
/// Implementations must not need coordination with the registry: the space
/// has to be large enough that collisions are negligible.
pub trait IdentityGenerator: Send + Sync {
    /// Produce a new identity.
    fn next(&self) -> Identity;
}

/// Generator backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy)]
pub struct RandomIdentityGenerator {
    length: usize,
}

impl RandomIdentityGenerator {
    /// Create a generator producing identities of `length` symbols,
    /// clamped to [`MIN_LENGTH`]..=[`MAX_LENGTH`].
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(MIN_LENGTH, MAX_LENGTH),
        }
    }

    /// Number of symbols in each generated identity.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomIdentityGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH)
    }
}

impl IdentityGenerator for RandomIdentityGenerator {
    fn next(&self) -> Identity {
        let mut bytes = [0u8; MAX_LENGTH];
        let bytes = &mut bytes[..self.length];
        OsRng.fill_bytes(bytes);
        let token = bytes
            .iter()
            .map(|b| char::from(ALPHABET[usize::from(b & 0x3f)]))
            .collect();
        Identity(token)
    }
}
