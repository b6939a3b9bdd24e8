//! Inbound message handling: registration on `start`, forwarding for
//! everything else.
//!
//! Delivery is at-most-once and unacknowledged. A message that cannot be
//! delivered is dropped and reported locally through [`RouteOutcome`]; the
//! sender never hears about it and the relay never retries.

use crate::channel::{Channel, ChannelId, DeliveryError};
use crate::registry::Registry;
use sigrelay_common::{Action, Envelope, Identity, IdentityGenerator};
use tracing::{debug, error, trace};

/// Why an inbound message was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The bytes were not a valid envelope.
    Malformed,
    /// A routed action arrived before the channel sent `start`.
    Unregistered,
    /// `data.remoteId` was absent, empty, or not a string.
    MissingDestination,
    /// No open channel is registered under `data.remoteId`.
    UnknownDestination,
    /// The destination closed between lookup and send.
    DeliveryFailed,
    /// The destination's outbound queue is full.
    QueueFull,
    /// A freshly minted identity was already registered.
    Internal,
}

impl DropReason {
    /// Metric label for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Unregistered => "unregistered",
            Self::MissingDestination => "missing_destination",
            Self::UnknownDestination => "unknown_destination",
            Self::DeliveryFailed => "delivery_failed",
            Self::QueueFull => "queue_full",
            Self::Internal => "internal",
        }
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// `start` was handled and the channel is now reachable under this identity.
    Registered(Identity),
    /// The message was queued on the destination channel.
    Forwarded {
        /// Destination identity.
        to: Identity,
        /// Metric label of the forwarded action.
        action: &'static str,
    },
    /// The message was dropped.
    Dropped(DropReason),
}

/// Resolves envelopes to channels through the shared [`Registry`].
pub struct Router {
    registry: Registry,
    identities: Box<dyn IdentityGenerator>,
}

impl Router {
    /// Create a router with an empty registry.
    #[must_use]
    pub fn new(identities: impl IdentityGenerator + 'static) -> Self {
        Self {
            registry: Registry::new(),
            identities: Box::new(identities),
        }
    }

    /// The identity table backing this router.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one inbound message from `source`.
    pub fn handle(&self, source: &mut Channel, raw: &[u8]) -> RouteOutcome {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(channel = %source.id(), "dropping message: {}", e);
                return RouteOutcome::Dropped(DropReason::Malformed);
            }
        };

        if envelope.action.is_routed() {
            self.forward(source, envelope)
        } else {
            self.start(source)
        }
    }

    /// Drop the registry entry owned by a closed channel.
    pub fn release(&self, channel: ChannelId, identity: Option<&Identity>) {
        if let Some(identity) = identity {
            if self.registry.remove_if_owned(identity.as_str(), channel) {
                debug!(channel = %channel, identity = %identity, "identity released");
            }
        }
    }

    fn start(&self, source: &mut Channel) -> RouteOutcome {
        let identity = self.identities.next();
        if let Err(e) = self.registry.register(identity.clone(), source.handle()) {
            error!(channel = %source.id(), "registry rejected minted identity: {}", e);
            return RouteOutcome::Dropped(DropReason::Internal);
        }

        // An identity the client never hears about must not stay routable.
        if let Err(e) = source.send(&Envelope::start_ack(&identity)) {
            debug!(channel = %source.id(), "failed to send start reply: {}", e);
            self.registry.remove_if_owned(identity.as_str(), source.id());
            let reason = match e {
                DeliveryError::QueueFull => DropReason::QueueFull,
                _ => DropReason::DeliveryFailed,
            };
            return RouteOutcome::Dropped(reason);
        }

        if let Some(previous) = source.set_identity(identity.clone()) {
            self.registry.remove_if_owned(previous.as_str(), source.id());
            debug!(channel = %source.id(), previous = %previous, "released previous identity");
        }
        debug!(channel = %source.id(), identity = %identity, "identity registered");
        RouteOutcome::Registered(identity)
    }

    fn forward(&self, source: &Channel, mut envelope: Envelope) -> RouteOutcome {
        let Some(sender) = source.identity() else {
            debug!(channel = %source.id(), action = %envelope.action, "dropping message from unregistered channel");
            return RouteOutcome::Dropped(DropReason::Unregistered);
        };

        let Some(remote_id) = envelope.remote_id() else {
            trace!(channel = %source.id(), action = %envelope.action, "no remoteId, dropping");
            return RouteOutcome::Dropped(DropReason::MissingDestination);
        };
        let to = Identity::from(remote_id);

        let Some(dest) = self.registry.lookup(to.as_str()) else {
            debug!(from = %sender, remote_id = %to, "failed to find remote channel");
            return RouteOutcome::Dropped(DropReason::UnknownDestination);
        };

        if envelope.action == Action::Offer {
            envelope.set_remote_id(sender);
        } else {
            envelope.clear_remote_id();
        }
        envelope.id = None;

        match dest.send(&envelope) {
            Ok(()) => RouteOutcome::Forwarded {
                to,
                action: action_label(&envelope.action),
            },
            Err(DeliveryError::QueueFull) => {
                debug!(from = %sender, to = %to, "destination queue full, dropping");
                RouteOutcome::Dropped(DropReason::QueueFull)
            }
            Err(e) => {
                debug!(from = %sender, to = %to, "delivery failed: {}", e);
                self.registry.remove_if_owned(to.as_str(), dest.id());
                RouteOutcome::Dropped(DropReason::DeliveryFailed)
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn action_label(action: &Action) -> &'static str {
    match action {
        Action::Start => "start",
        Action::Offer => "offer",
        Action::Answer => "answer",
        Action::Candidate => "candidate",
        Action::Other(_) => "other",
    }
}
