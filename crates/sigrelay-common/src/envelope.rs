//! Signaling envelope serialization and parsing.
//!
//! Every message on the wire is a single JSON object:
//!
//! ```json
//! {"action": "offer", "data": {"remoteId": "V1StGXR8_Z5jdHi6B-myT", "sdp": "..."}}
//! ```
//!
//! The relay interprets `action` and `data.remoteId` only. Everything else in
//! `data`, and any unknown top-level field, passes through untouched.

use crate::identity::Identity;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Name of the destination field inside `data`.
pub const REMOTE_ID_FIELD: &str = "remoteId";

/// Wire names of the actions the relay knows about.
pub mod action {
    /// Registration request, answered locally by the relay.
    pub const START: &str = "start";
    /// Session offer.
    pub const OFFER: &str = "offer";
    /// Session answer.
    pub const ANSWER: &str = "answer";
    /// Connectivity candidate.
    pub const CANDIDATE: &str = "candidate";
}

/// The `action` field of an envelope.
///
/// Unknown action names are kept as [`Action::Other`] and routed like
/// `answer` or `candidate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// Register the sending channel and mint an identity for it.
    Start,
    /// Session offer; the recipient learns the sender's identity.
    Offer,
    /// Session answer.
    Answer,
    /// Connectivity candidate.
    Candidate,
    /// Any other relay-only action.
    Other(String),
}

impl Action {
    /// Wire name of this action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => action::START,
            Self::Offer => action::OFFER,
            Self::Answer => action::ANSWER,
            Self::Candidate => action::CANDIDATE,
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for every action the relay forwards to a peer.
    #[must_use]
    pub fn is_routed(&self) -> bool {
        !matches!(self, Self::Start)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        match name.as_str() {
            action::START => Self::Start,
            action::OFFER => Self::Offer,
            action::ANSWER => Self::Answer,
            action::CANDIDATE => Self::Candidate,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed signaling message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// What the sender wants done with this message.
    pub action: Action,
    /// Opaque negotiation payload. Only `remoteId` is read by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Identity minted for the receiver; set only on the `start` reply.
    ///
    /// Inbound values that are not strings are discarded rather than
    /// rejected.
    #[serde(
        default,
        deserialize_with = "string_or_discard",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Unknown top-level fields, preserved on forward.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_discard<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Ok(Some(id)),
        _ => Ok(None),
    }
}

/// Errors that can occur while decoding or encoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The bytes are not a JSON object with a string `action`.
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),
    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Envelope {
    /// Build an envelope with the given action and payload.
    #[must_use]
    pub fn new(action: impl Into<Action>, data: Value) -> Self {
        Self {
            action: action.into(),
            data: Some(data),
            id: None,
            extra: Map::new(),
        }
    }

    /// A registration request as sent by clients.
    #[must_use]
    pub fn start() -> Self {
        Self {
            action: Action::Start,
            data: None,
            id: None,
            extra: Map::new(),
        }
    }

    /// The relay's reply to `start`: `{"action":"start","id":"<identity>"}`.
    #[must_use]
    pub fn start_ack(identity: &Identity) -> Self {
        Self {
            action: Action::Start,
            data: None,
            id: Some(identity.to_string()),
            extra: Map::new(),
        }
    }

    /// Parse an envelope from raw message bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] if the bytes are not valid JSON or
    /// lack a string `action`.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::Decode)
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }

    /// Destination identity named in `data.remoteId`.
    ///
    /// Returns `None` when `data` is not an object, the field is missing,
    /// or it is not a non-empty string.
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .as_object()?
            .get(REMOTE_ID_FIELD)?
            .as_str()
            .filter(|id| !id.is_empty())
    }

    /// Overwrite `data.remoteId`. Has no effect when `data` is not an object.
    pub fn set_remote_id(&mut self, identity: &Identity) {
        if let Some(Value::Object(data)) = self.data.as_mut() {
            data.insert(
                REMOTE_ID_FIELD.to_string(),
                Value::String(identity.to_string()),
            );
        }
    }

    /// Remove `data.remoteId` if present.
    pub fn clear_remote_id(&mut self) {
        if let Some(Value::Object(data)) = self.data.as_mut() {
            data.remove(REMOTE_ID_FIELD);
        }
    }
}
