//! A single session to the pub/sub service.
//!
//! Each [`Connection`] owns one WebSocket session, one mutable topic set
//! (capped at [`MAX_TOPICS_PER_CONNECTION`]), and four background tasks:
//!
//! - **reader**: receives frames and dispatches envelopes to callbacks
//! - **heartbeat sender**: sends a PING once per keepalive interval
//! - **heartbeat watchdog**: tears the session down when a PONG is overdue
//! - **reconnector**: dials whenever the connection is down but has topics
//!
//! The reconnector is the only path that establishes a session, including
//! the very first one: creating a connection does not block on the dial.
//! After every (re)connect the full topic set is re-declared with a single
//! LISTEN request, which is how subscriptions survive any disconnection.

mod heartbeat;
mod reader;
mod reconnector;
pub(crate) mod websocket;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use url::Url;

use crate::error::Result;
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::Envelope;
use crate::timeouts::PubSubTimeouts;

use websocket::{WsSink, WsSource};

/// Identity of a connection, unique for the lifetime of its owner.
pub type ConnectionId = u64;

/// Maximum number of topics one connection may carry. Imposed by the remote
/// service; additions beyond the cap are ignored.
pub const MAX_TOPICS_PER_CONNECTION: usize = 50;

/// Connection lifecycle state. Guarded by the same lock as the topic set so
/// that "check state" and "act on state" are one atomic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    /// No session; the reconnector will dial once the topic set is
    /// non-empty.
    Disconnected,
    /// The reconnector is dialing.
    Connecting,
    /// A session is established and frames are flowing.
    Active,
    /// Terminal: `close()` was called or the topic set drained to zero.
    Closing,
}

/// State shared by the public handle and the background loops, guarded by
/// one lock. Holding the lock across a send is what serializes topic
/// mutations with their LISTEN/UNLISTEN requests.
pub(crate) struct ConnectionInner {
    pub(crate) state: ConnectionState,
    pub(crate) topics: BTreeSet<String>,
    /// Write half of the current session, present only while `Active`.
    pub(crate) sink: Option<WsSink>,
    /// Read half of the current session, parked here until the reader
    /// claims it.
    pub(crate) source: Option<WsSource>,
    /// When the last PING was sent (or the last PONG arrived).
    pub(crate) ping_start: Instant,
    /// A PING is outstanding and the watchdog is counting down.
    pub(crate) awaiting_pong: bool,
    /// Bumped on every session install; loops tag their work with the epoch
    /// they observed so a stale failure cannot tear down a newer session.
    pub(crate) epoch: u64,
}

pub(crate) struct ConnectionCore {
    pub(crate) id: ConnectionId,
    pub(crate) url: Url,
    pub(crate) timeouts: PubSubTimeouts,
    pub(crate) inner: Mutex<ConnectionInner>,
    pub(crate) handlers: RwLock<EventHandlers>,
    /// Mirrors `state == Active` for cheap synchronous reads.
    pub(crate) connected: AtomicBool,
    /// Set once by `close()`; never cleared.
    pub(crate) closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionCore {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Sleep for `dur`, waking early on shutdown. Returns `false` when the
    /// connection is closing and the caller's loop should exit.
    pub(crate) async fn wait(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        dur: std::time::Duration,
    ) -> bool {
        if self.is_closed() {
            return false;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => false,
            _ = tokio::time::sleep(dur) => !self.is_closed(),
        }
    }

    /// Tear down the session tagged by `epoch` if it is still the current,
    /// active one: mark disconnected, reset heartbeat bookkeeping and close
    /// the transport. Returns `true` when this call performed the
    /// transition; the caller then fires `on_disconnect` exactly once.
    pub(crate) async fn invalidate_session(
        &self,
        inner: &mut ConnectionInner,
        epoch: u64,
    ) -> bool {
        if inner.epoch != epoch || inner.state != ConnectionState::Active {
            return false;
        }
        inner.state = ConnectionState::Disconnected;
        self.connected.store(false, Ordering::SeqCst);
        inner.awaiting_pong = false;
        inner.ping_start = Instant::now();
        inner.source = None;
        if let Some(mut sink) = inner.sink.take() {
            websocket::close_sink(&mut sink).await;
        }
        true
    }

    /// Send `envelope` on the active session. On failure fire `on_error`,
    /// invalidate the session and fire `on_disconnect`; the reconnector
    /// takes it from there.
    pub(crate) async fn send_or_invalidate(
        &self,
        inner: &mut ConnectionInner,
        envelope: &Envelope,
    ) {
        let epoch = inner.epoch;
        let Some(sink) = inner.sink.as_mut() else {
            return;
        };
        if let Err(e) = websocket::send_envelope(sink, envelope).await {
            log::warn!("[pubsub-link] [conn {}] send failed: {}", self.id, e);
            self.emit_error(ConnectionError::new(e.to_string(), true));
            if self.invalidate_session(inner, epoch).await {
                self.emit_disconnect(DisconnectReason::new(format!("send failed: {}", e)));
            }
        }
    }

    /// Terminal teardown shared by `close()` and the empty-topic-set path.
    /// The caller must have won the `closed` flag before invoking this.
    pub(crate) async fn finish_close(&self, inner: &mut ConnectionInner) {
        inner.state = ConnectionState::Closing;
        self.connected.store(false, Ordering::SeqCst);
        inner.awaiting_pong = false;
        inner.source = None;
        if let Some(mut sink) = inner.sink.take() {
            websocket::close_sink(&mut sink).await;
        }
        let _ = self.shutdown_tx.send(true);
        log::debug!("[pubsub-link] [conn {}] closed", self.id);
    }

    // ---------------------------------------------------------------
    // Callback dispatch
    // ---------------------------------------------------------------

    fn handlers(&self) -> EventHandlers {
        self.handlers.read().unwrap().clone()
    }

    pub(crate) fn emit_connect(&self) {
        self.handlers().emit_connect(self.id);
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        self.handlers().emit_disconnect(self.id, reason);
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        self.handlers().emit_error(self.id, error);
    }

    pub(crate) fn emit_info(&self, message: &str) {
        self.handlers().emit_info(self.id, message);
    }

    pub(crate) fn emit_message(&self, envelope: &Envelope) {
        self.handlers().emit_message(self.id, envelope);
    }

    pub(crate) fn emit_ping(&self, start: Instant) {
        self.handlers().emit_ping(self.id, start);
    }

    pub(crate) fn emit_pong(&self, start: Instant, end: Instant) {
        self.handlers().emit_pong(self.id, start, end);
    }
}

/// One logical session to the pub/sub service.
///
/// Usually created and owned by [`PubSub`](crate::PubSub), which shards
/// topics across a pool of connections; standalone use is supported through
/// [`Connection::builder`].
///
/// Connections must be [`close`](Connection::close)d before disposal.
/// Dropping without closing stops the background loops as a backstop but
/// skips the graceful transport shutdown.
pub struct Connection {
    core: Arc<ConnectionCore>,
    _tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Create a builder for a standalone connection.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use pubsub_link::Connection;
    ///
    /// # async fn example() -> pubsub_link::Result<()> {
    /// let conn = Connection::builder("wss://pubsub.example.com").build()?;
    /// conn.add_topic("alerts.42").await;
    /// // ... the reconnector dials and issues the LISTEN ...
    /// conn.close().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(url: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder {
            url: url.into(),
            id: 0,
            timeouts: PubSubTimeouts::default(),
            handlers: EventHandlers::new(),
        }
    }

    /// Allocate the shared state and start the four background loops. Does
    /// not dial; the reconnector establishes the first session once a topic
    /// is added.
    pub(crate) fn spawn(
        id: ConnectionId,
        url: Url,
        timeouts: PubSubTimeouts,
        handlers: EventHandlers,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let core = Arc::new(ConnectionCore {
            id,
            url,
            timeouts,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Disconnected,
                topics: BTreeSet::new(),
                sink: None,
                source: None,
                ping_start: Instant::now(),
                awaiting_pong: false,
                epoch: 0,
            }),
            handlers: RwLock::new(handlers),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        });

        let tasks = vec![
            tokio::spawn(reader::reader_loop(core.clone())),
            tokio::spawn(heartbeat::sender_loop(core.clone())),
            tokio::spawn(heartbeat::watchdog_loop(core.clone())),
            tokio::spawn(reconnector::reconnector_loop(core.clone())),
        ];

        Self {
            core,
            _tasks: tasks,
        }
    }

    /// This connection's identity.
    pub fn id(&self) -> ConnectionId {
        self.core.id
    }

    /// The endpoint this connection dials.
    pub fn url(&self) -> &str {
        self.core.url.as_str()
    }

    /// Returns `true` while a session to the service is established.
    pub fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::Relaxed)
    }

    /// Returns `true` once the connection has been closed, either via
    /// [`close`](Connection::close) or by draining its topic set to zero.
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Subscribe this connection to `topic`.
    ///
    /// No-op when the topic is already present, when the set is at
    /// [`MAX_TOPICS_PER_CONNECTION`], or when the connection is closed.
    /// While a session is active the FULL current topic set is re-declared
    /// with one LISTEN request: the service replaces declared interest per
    /// request rather than accumulating it, so a delta would drop every
    /// other topic.
    ///
    /// Never fails: without an active session the topic is retained locally
    /// and declared by the reconnector on the next connect.
    pub async fn add_topic(&self, topic: impl Into<String>) {
        let topic = topic.into();
        let mut inner = self.core.inner.lock().await;
        if self.core.is_closed() {
            return;
        }
        if inner.topics.contains(&topic) {
            return;
        }
        if inner.topics.len() >= MAX_TOPICS_PER_CONNECTION {
            log::debug!(
                "[pubsub-link] [conn {}] topic limit reached, ignoring {}",
                self.core.id,
                topic
            );
            return;
        }
        inner.topics.insert(topic);
        if inner.state == ConnectionState::Active {
            let frame = Envelope::listen(inner.topics.iter().cloned().collect());
            self.core.send_or_invalidate(&mut inner, &frame).await;
        }
    }

    /// Unsubscribe this connection from `topic`.
    ///
    /// No-op when the topic is absent. While active, issues an UNLISTEN for
    /// just that topic. A connection never stays alive without topics: when
    /// the set drains to zero the connection closes itself.
    pub async fn remove_topic(&self, topic: &str) {
        let mut inner = self.core.inner.lock().await;
        if !inner.topics.remove(topic) {
            return;
        }
        if inner.state == ConnectionState::Active {
            let frame = Envelope::unlisten(vec![topic.to_owned()]);
            self.core.send_or_invalidate(&mut inner, &frame).await;
        }
        if inner.topics.is_empty() && !self.core.closed.swap(true, Ordering::SeqCst) {
            self.core.finish_close(&mut inner).await;
        }
    }

    /// Unsubscribe from every topic. The emptied connection closes itself,
    /// as in [`remove_topic`](Connection::remove_topic).
    pub async fn remove_all_topics(&self) {
        let mut inner = self.core.inner.lock().await;
        if inner.topics.is_empty() {
            return;
        }
        inner.topics.clear();
        if !self.core.closed.swap(true, Ordering::SeqCst) {
            self.core.finish_close(&mut inner).await;
        }
    }

    /// All currently subscribed topics.
    pub async fn topics(&self) -> Vec<String> {
        let inner = self.core.inner.lock().await;
        inner.topics.iter().cloned().collect()
    }

    /// Whether `topic` is in this connection's subscription set.
    pub async fn has_topic(&self, topic: &str) -> bool {
        let inner = self.core.inner.lock().await;
        inner.topics.contains(topic)
    }

    /// Number of subscribed topics.
    pub async fn topics_count(&self) -> usize {
        let inner = self.core.inner.lock().await;
        inner.topics.len()
    }

    /// Close the connection: stop every background loop and shut the
    /// transport down. Idempotent and callable from any state, including
    /// concurrently with in-flight operations; after it returns no loop
    /// issues further network I/O.
    pub async fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.core.inner.lock().await;
        self.core.finish_close(&mut inner).await;
    }

    // ---------------------------------------------------------------
    // Event registration
    // ---------------------------------------------------------------

    /// Rebind the connect callback.
    pub fn on_connect(&self, f: impl Fn(ConnectionId) + Send + Sync + 'static) {
        self.core.handlers.write().unwrap().on_connect = Some(Arc::new(f));
    }

    /// Rebind the disconnect callback.
    pub fn on_disconnect(
        &self,
        f: impl Fn(ConnectionId, DisconnectReason) + Send + Sync + 'static,
    ) {
        self.core.handlers.write().unwrap().on_disconnect = Some(Arc::new(f));
    }

    /// Rebind the error callback.
    pub fn on_error(&self, f: impl Fn(ConnectionId, ConnectionError) + Send + Sync + 'static) {
        self.core.handlers.write().unwrap().on_error = Some(Arc::new(f));
    }

    /// Rebind the info callback.
    pub fn on_info(&self, f: impl Fn(ConnectionId, &str) + Send + Sync + 'static) {
        self.core.handlers.write().unwrap().on_info = Some(Arc::new(f));
    }

    /// Rebind the message callback.
    pub fn on_message(&self, f: impl Fn(ConnectionId, &Envelope) + Send + Sync + 'static) {
        self.core.handlers.write().unwrap().on_message = Some(Arc::new(f));
    }

    /// Rebind the ping callback.
    pub fn on_ping(&self, f: impl Fn(ConnectionId, Instant) + Send + Sync + 'static) {
        self.core.handlers.write().unwrap().on_ping = Some(Arc::new(f));
    }

    /// Rebind the pong callback.
    pub fn on_pong(&self, f: impl Fn(ConnectionId, Instant, Instant) + Send + Sync + 'static) {
        self.core.handlers.write().unwrap().on_pong = Some(Arc::new(f));
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Backstop when close() was not called: stop the loops. The
        // transport halves die with the shared core.
        self.core.closed.store(true, Ordering::SeqCst);
        let _ = self.core.shutdown_tx.send(true);
    }
}

/// Builder for a standalone [`Connection`].
#[derive(Debug)]
pub struct ConnectionBuilder {
    url: String,
    id: ConnectionId,
    timeouts: PubSubTimeouts,
    handlers: EventHandlers,
}

impl ConnectionBuilder {
    /// Set the connection identity (defaults to 0). The orchestrator
    /// allocates these from its own counter; standalone users pick their
    /// own.
    pub fn id(mut self, id: ConnectionId) -> Self {
        self.id = id;
        self
    }

    /// Set the timeout configuration.
    pub fn timeouts(mut self, timeouts: PubSubTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the initial event handlers.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Validate the endpoint, start the background loops and return the
    /// connection. Does not wait for a session to be established.
    pub fn build(self) -> Result<Connection> {
        let url = websocket::parse_endpoint(&self.url)?;
        Ok(Connection::spawn(self.id, url, self.timeouts, self.handlers))
    }
}
