use crate::channel::{ChannelHandle, ChannelId};
use crate::error::RelayError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sigrelay_common::Identity;

/// Concurrent identity → channel table.
///
/// Each operation is atomic on its own. Nothing spans two operations, so a
/// handle returned by [`Registry::lookup`] may close before it is used;
/// sending on it then fails with a delivery error.
#[derive(Debug, Default)]
pub struct Registry {
    routes: DashMap<Identity, ChannelHandle>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateIdentity`] if the identity is already
    /// bound to an open channel. The existing binding is left untouched.
    pub fn register(&self, identity: Identity, handle: ChannelHandle) -> Result<(), RelayError> {
        match self.routes.entry(identity) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_open() {
                    return Err(RelayError::DuplicateIdentity(entry.key().clone()));
                }
                entry.insert(handle);
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
            }
        }
        Ok(())
    }

    /// Resolve an identity to an open channel.
    ///
    /// A stale entry whose channel already closed is evicted and reported as
    /// absent.
    #[must_use]
    pub fn lookup(&self, identity: &str) -> Option<ChannelHandle> {
        let handle = self.routes.get(identity).map(|entry| entry.value().clone())?;
        if handle.is_open() {
            return Some(handle);
        }
        self.routes
            .remove_if(identity, |_, v| v.id() == handle.id());
        None
    }

    /// Unbind an identity. Removing an absent identity is a no-op.
    pub fn remove(&self, identity: &str) {
        self.routes.remove(identity);
    }

    /// Unbind an identity only if it is still bound to `channel`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove_if_owned(&self, identity: &str, channel: ChannelId) -> bool {
        self.routes
            .remove_if(identity, |_, v| v.id() == channel)
            .is_some()
    }

    /// Number of registered identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no identity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
