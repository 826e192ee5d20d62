//! Inbound and outbound message shapes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{IdentityKey, ProtocolError, Result, frame};

/// Message received from a client.
///
/// The same shape serves two protocol phases: the first message a connection
/// sends announces its identity, every later one is a send to `target_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    /// Application-defined message kind, relayed untouched
    #[serde(rename = "type")]
    pub kind: i64,

    /// Realm shared by sender and target
    #[serde(rename = "user_type")]
    pub sender_realm: i64,

    /// Recipient ID within the sender's realm
    #[serde(rename = "id")]
    pub target_id: i64,

    /// Sender ID within its realm
    #[serde(rename = "from")]
    pub sender_id: i64,

    /// Opaque payload
    #[serde(rename = "msg")]
    pub body: String,
}

impl InboundMessage {
    /// Decode a raw frame.
    ///
    /// Newlines are folded into spaces and surrounding whitespace removed
    /// before parsing.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let normalized = frame::normalize(raw);
        if normalized.is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(serde_json::from_slice(&normalized)?)
    }

    /// Encode for the wire. Used by clients and tests.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Identity key the sender claims.
    pub const fn sender_key(&self) -> IdentityKey {
        IdentityKey::new(self.sender_realm, self.sender_id)
    }
}

/// Message delivered to a recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Kind copied from the inbound message
    #[serde(rename = "type")]
    pub kind: i64,

    /// Sender ID (the realm is implied by the recipient's own)
    #[serde(rename = "from")]
    pub sender_id: i64,

    /// Forwarded payload
    #[serde(rename = "msg")]
    pub body: String,
}

impl OutboundMessage {
    /// Encode for the wire.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a single outbound message. Used by clients and tests.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}
