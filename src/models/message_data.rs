use serde::{Deserialize, Serialize};

/// `data` payload of a MESSAGE push.
///
/// The service delivers the application body as an opaque string in
/// `message`; interpreting it is the caller's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// Canonical topic the message was published to.
    #[serde(default)]
    pub topic: String,

    /// Raw application payload.
    #[serde(default)]
    pub message: String,
}
