//! Connection lifecycle event handlers.
//!
//! Provides callback-based hooks for monitoring pub/sub connections:
//!
//! - [`on_connect`](EventHandlers::on_connect): a session was established
//! - [`on_disconnect`](EventHandlers::on_disconnect): a session was lost or closed
//! - [`on_error`](EventHandlers::on_error): a transport, protocol or decode error
//! - [`on_info`](EventHandlers::on_info): informational lifecycle notices
//! - [`on_message`](EventHandlers::on_message): a MESSAGE push arrived
//! - [`on_ping`](EventHandlers::on_ping): a keepalive PING was sent
//! - [`on_pong`](EventHandlers::on_pong): the matching PONG arrived
//!
//! Callbacks run inline on whichever background loop detects the condition,
//! possibly while that connection's internal lock is held. They must not
//! block and must not call back into the connection's async API; hand the
//! event off to a channel when real work is needed.
//!
//! # Example
//!
//! ```rust
//! use pubsub_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|id| println!("connection {} is up", id))
//!     .on_disconnect(|id, reason| println!("connection {} lost: {}", id, reason))
//!     .on_message(|id, envelope| println!("connection {} push: {:?}", id, envelope));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::connection::ConnectionId;
use crate::models::Envelope;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the session ended.
    pub message: String,
    /// WebSocket close code, if the server sent one.
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Create a new disconnect reason with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Create a new disconnect reason with a message and close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the connection keeps retrying after this error. Transport
    /// failures are recoverable; a RESPONSE envelope rejecting a request
    /// is not retried.
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Type alias for the on_connect callback.
pub type OnConnectCallback = Arc<dyn Fn(ConnectionId) + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(ConnectionId, DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionId, ConnectionError) + Send + Sync>;

/// Type alias for the on_info callback.
pub type OnInfoCallback = Arc<dyn Fn(ConnectionId, &str) + Send + Sync>;

/// Type alias for the on_message callback.
pub type OnMessageCallback = Arc<dyn Fn(ConnectionId, &Envelope) + Send + Sync>;

/// Type alias for the on_ping callback.
pub type OnPingCallback = Arc<dyn Fn(ConnectionId, Instant) + Send + Sync>;

/// Type alias for the on_pong callback.
pub type OnPongCallback = Arc<dyn Fn(ConnectionId, Instant, Instant) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional; invoking an unset slot is a no-op. The builder
/// pattern makes it easy to register only the handlers you need. Handlers
/// are `Send + Sync` so they can fire from any background loop.
#[derive(Clone, Default)]
pub struct EventHandlers {
    /// Called when a session to the service is established.
    pub(crate) on_connect: Option<OnConnectCallback>,

    /// Called when a session is lost or intentionally torn down.
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,

    /// Called on transport, protocol or decode errors.
    pub(crate) on_error: Option<OnErrorCallback>,

    /// Called with informational lifecycle notices (reconnect hints,
    /// keepalive warnings, successful RESPONSE acks).
    pub(crate) on_info: Option<OnInfoCallback>,

    /// Called for every MESSAGE push with the parsed envelope.
    pub(crate) on_message: Option<OnMessageCallback>,

    /// Called when a keepalive PING is sent, with the send time.
    pub(crate) on_ping: Option<OnPingCallback>,

    /// Called when a PONG arrives, with the PING send time and the arrival
    /// time.
    pub(crate) on_pong: Option<OnPongCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_info", &self.on_info.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_ping", &self.on_ping.is_some())
            .field("on_pong", &self.on_pong.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when a session is established.
    pub fn on_connect(mut self, f: impl Fn(ConnectionId) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a session is lost or closed.
    pub fn on_disconnect(
        mut self,
        f: impl Fn(ConnectionId, DisconnectReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a connection error occurs.
    ///
    /// The callback receives a [`ConnectionError`] indicating whether the
    /// connection keeps retrying (transport failures) or not (a request the
    /// service rejected).
    pub fn on_error(
        mut self,
        f: impl Fn(ConnectionId, ConnectionError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked with informational lifecycle notices.
    pub fn on_info(mut self, f: impl Fn(ConnectionId, &str) + Send + Sync + 'static) -> Self {
        self.on_info = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every MESSAGE push.
    pub fn on_message(
        mut self,
        f: impl Fn(ConnectionId, &Envelope) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a keepalive PING is sent.
    pub fn on_ping(mut self, f: impl Fn(ConnectionId, Instant) + Send + Sync + 'static) -> Self {
        self.on_ping = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a PONG arrives. Receives the PING
    /// send time and the PONG arrival time, so the round-trip is
    /// `end - start`.
    pub fn on_pong(
        mut self,
        f: impl Fn(ConnectionId, Instant, Instant) + Send + Sync + 'static,
    ) -> Self {
        self.on_pong = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_info.is_some()
            || self.on_message.is_some()
            || self.on_ping.is_some()
            || self.on_pong.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    /// Dispatch the on_connect event.
    pub(crate) fn emit_connect(&self, id: ConnectionId) {
        if let Some(cb) = &self.on_connect {
            cb(id);
        }
    }

    /// Dispatch the on_disconnect event.
    pub(crate) fn emit_disconnect(&self, id: ConnectionId, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(id, reason);
        }
    }

    /// Dispatch the on_error event.
    pub(crate) fn emit_error(&self, id: ConnectionId, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(id, error);
        }
    }

    /// Dispatch the on_info event.
    pub(crate) fn emit_info(&self, id: ConnectionId, message: &str) {
        if let Some(cb) = &self.on_info {
            cb(id, message);
        }
    }

    /// Dispatch the on_message event.
    pub(crate) fn emit_message(&self, id: ConnectionId, envelope: &Envelope) {
        if let Some(cb) = &self.on_message {
            cb(id, envelope);
        }
    }

    /// Dispatch the on_ping event.
    pub(crate) fn emit_ping(&self, id: ConnectionId, start: Instant) {
        if let Some(cb) = &self.on_ping {
            cb(id, start);
        }
    }

    /// Dispatch the on_pong event.
    pub(crate) fn emit_pong(&self, id: ConnectionId, start: Instant, end: Instant) {
        if let Some(cb) = &self.on_pong {
            cb(id, start, end);
        }
    }
}
