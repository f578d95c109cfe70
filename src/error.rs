//! Error types for the pubsub-link client library.

use thiserror::Error;

/// Errors produced by the pubsub-link client.
///
/// Failures are reported through the [`on_error`](crate::EventHandlers::on_error)
/// callback rather than returned from subscription operations: a connection
/// that cannot reach the service keeps its local topic state and retries
/// forever, so `listen`/`unlisten` have nothing to fail with.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The endpoint URL could not be parsed or has a non-WebSocket scheme.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// A dial, send or receive on the WebSocket transport failed.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Establishing a connection took longer than the configured timeout.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// An inbound frame could not be decoded as a protocol envelope.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// An outbound envelope could not be serialized.
    #[error("Encode error: {0}")]
    EncodeError(String),
}

/// Result type for pubsub-link operations.
pub type Result<T> = std::result::Result<T, PubSubError>;
