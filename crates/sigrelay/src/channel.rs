//! One peer's live connection, as seen by the router and the registry.
//!
//! A [`Channel`] is owned by its connection task for the lifetime of the
//! socket. Everything else holds a [`ChannelHandle`]: a cheap clone of the
//! outbound queue sender that can enqueue messages but cannot keep the
//! connection alive. Once the connection task drops its receiver, every
//! handle reports the channel as closed.

use sigrelay_common::{Envelope, EnvelopeError, Identity};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local connection number, used to tell channels apart in the
/// registry and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a message could not be handed to a channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The channel is closed or closing.
    #[error("channel closed")]
    Closed,
    /// The channel's outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,
    /// The envelope could not be serialized.
    #[error(transparent)]
    Encode(#[from] EnvelopeError),
}

/// Non-owning send capability for a channel.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    id: ChannelId,
    tx: mpsc::Sender<String>,
}

impl ChannelHandle {
    /// Identifier of the channel this handle points at.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Returns `true` while the owning connection is still reading its queue.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Enqueue an envelope for transmission without waiting for the write.
    ///
    /// # Errors
    ///
    /// Fails fast with [`DeliveryError::Closed`] if the channel has closed,
    /// or [`DeliveryError::QueueFull`] if the peer is not draining its queue.
    pub fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        if self.tx.is_closed() {
            return Err(DeliveryError::Closed);
        }
        let text = envelope.to_json()?;
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

type CloseHook = Box<dyn FnOnce(ChannelId, Option<&Identity>) + Send + 'static>;

/// A connected peer, owned by its connection task.
pub struct Channel {
    handle: ChannelHandle,
    identity: Option<Identity>,
    on_close: Option<CloseHook>,
}

impl Channel {
    /// Create a channel with an outbound queue of `capacity` messages.
    ///
    /// Returns the channel and the receiving end of its queue, which the
    /// connection task drains into the socket.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            handle: ChannelHandle {
                id: ChannelId::next(),
                tx,
            },
            identity: None,
            on_close: None,
        };
        (channel, rx)
    }

    /// Identifier of this channel.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.handle.id
    }

    /// A handle suitable for storing in the registry.
    #[must_use]
    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    /// Identity bound by the last `start`, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Attach a new identity, returning the previous one.
    pub fn set_identity(&mut self, identity: Identity) -> Option<Identity> {
        self.identity.replace(identity)
    }

    /// Send an envelope on this channel.
    ///
    /// # Errors
    ///
    /// See [`ChannelHandle::send`].
    pub fn send(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        self.handle.send(envelope)
    }

    /// Install the shutdown hook. Only one hook is kept; installing another
    /// replaces it.
    pub fn on_close<F>(&mut self, hook: F)
    where
        F: FnOnce(ChannelId, Option<&Identity>) + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
    }

    /// Run the shutdown hook. Later calls, and the drop that follows, are
    /// no-ops.
    pub fn close(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook(self.handle.id, self.identity.as_ref());
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.handle.id)
            .field("identity", &self.identity)
            .field("has_close_hook", &self.on_close.is_some())
            .finish()
    }
}
