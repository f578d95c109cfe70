use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{MessageData, TopicsData};

/// Envelope type vocabulary, fixed by the remote protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeType {
    /// Declare interest in a set of topics. Replaces, never accumulates:
    /// each LISTEN carries the sender's full current topic set.
    Listen,
    /// Withdraw interest in a set of topics.
    Unlisten,
    /// Server push carrying an application payload for one topic.
    Message,
    /// Client keepalive probe.
    Ping,
    /// Server reply to a PING.
    Pong,
    /// Server hint that the client should drop and re-establish the session.
    Reconnect,
    /// Server acknowledgment of a prior request; `error` is set on failure.
    Response,
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeType::Listen => "LISTEN",
            EnvelopeType::Unlisten => "UNLISTEN",
            EnvelopeType::Message => "MESSAGE",
            EnvelopeType::Ping => "PING",
            EnvelopeType::Pong => "PONG",
            EnvelopeType::Reconnect => "RECONNECT",
            EnvelopeType::Response => "RESPONSE",
        };
        write!(f, "{}", name)
    }
}

/// Protocol envelope exchanged with the pub/sub service as a JSON text frame.
///
/// Envelopes are ephemeral: one is built per send and one per received frame,
/// nothing is persisted. `error` and `nonce` are omitted from the wire when
/// empty, matching the service's own encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope type.
    #[serde(rename = "type")]
    pub kind: EnvelopeType,

    /// Payload: a topic list for LISTEN/UNLISTEN, an application-defined
    /// message object for MESSAGE pushes, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Error description for RESPONSE envelopes; empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    /// Optional correlation id echoed back by the service.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
}

impl Envelope {
    /// Create an envelope of the given type with no payload.
    pub fn new(kind: EnvelopeType) -> Self {
        Self {
            kind,
            data: None,
            error: String::new(),
            nonce: String::new(),
        }
    }

    /// Build a LISTEN request declaring interest in `topics`.
    pub fn listen(topics: Vec<String>) -> Self {
        Self {
            data: Some(json!({ "topics": topics })),
            ..Self::new(EnvelopeType::Listen)
        }
    }

    /// Build an UNLISTEN request withdrawing interest in `topics`.
    pub fn unlisten(topics: Vec<String>) -> Self {
        Self {
            data: Some(json!({ "topics": topics })),
            ..Self::new(EnvelopeType::Unlisten)
        }
    }

    /// Build a keepalive PING.
    pub fn ping() -> Self {
        Self::new(EnvelopeType::Ping)
    }

    /// Returns `true` when the envelope carries a non-empty error field.
    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// Decode the payload as a topic list (LISTEN/UNLISTEN requests).
    pub fn topics(&self) -> Option<TopicsData> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }

    /// Decode the payload as a message push (MESSAGE envelopes).
    pub fn message(&self) -> Option<MessageData> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}
