//! Topic-sharding orchestrator.
//!
//! [`PubSub`] owns a growable pool of [`Connection`]s and spreads an
//! unbounded number of topic subscriptions across it, respecting the
//! per-connection topic cap imposed by the service. A new connection is
//! created only when no existing connection has room; a connection whose
//! last topic is removed is closed and evicted. Together the pool and each
//! connection's topic set are the entire subscription ledger; nothing is
//! persisted.
//!
//! All pool mutations run under one coarse lock: subscription churn is
//! low-frequency compared to message delivery, so correctness wins over
//! throughput here. Dropping an in-flight `listen`/`unlisten` future (for
//! example from an external timeout) releases the lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::Mutex;
use url::Url;

use crate::connection::{
    websocket, Connection, ConnectionId, MAX_TOPICS_PER_CONNECTION,
};
use crate::error::Result;
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::Envelope;
use crate::timeouts::PubSubTimeouts;
use crate::topic::{build_topic, TopicParams};

/// Pub/sub client that shards topics across a pool of connections.
///
/// # Examples
///
/// ```rust,no_run
/// use pubsub_link::{EventHandlers, PubSub};
///
/// # async fn example() -> pubsub_link::Result<()> {
/// let pubsub = PubSub::builder("wss://pubsub.example.com")
///     .event_handlers(
///         EventHandlers::new()
///             .on_message(|id, envelope| println!("conn {}: {:?}", id, envelope)),
///     )
///     .build()?;
///
/// pubsub.listen("channel-points", (42,)).await;
/// pubsub.listen("chat-moderation", (42, "mods")).await;
/// assert_eq!(pubsub.topics_count().await, 2);
///
/// pubsub.unlisten("channel-points", (42,)).await;
/// pubsub.close().await;
/// # Ok(())
/// # }
/// ```
pub struct PubSub {
    url: Url,
    timeouts: PubSubTimeouts,
    /// Handler snapshot applied to connections created from now on.
    handlers: RwLock<EventHandlers>,
    /// Connection identity allocator; ids are never reused.
    next_id: AtomicU64,
    pool: Mutex<BTreeMap<ConnectionId, Connection>>,
}

impl PubSub {
    /// Create a client for `url` with default configuration.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::builder(url).build()
    }

    /// Create a builder for custom configuration.
    pub fn builder(url: impl Into<String>) -> PubSubBuilder {
        PubSubBuilder {
            url: url.into(),
            timeouts: PubSubTimeouts::default(),
            handlers: EventHandlers::new(),
        }
    }

    /// Build the canonical topic string for `name` and `params`.
    ///
    /// Parameters may be numbers or strings; both forms produce the same
    /// topic. See [`build_topic`].
    pub fn topic<P: TopicParams>(&self, name: &str, params: P) -> String {
        build_topic(name, params)
    }

    /// Subscribe to the topic built from `name` and `params`.
    ///
    /// Idempotent: a topic already held anywhere in the pool is left where
    /// it is. Otherwise the first connection with room takes it, and when
    /// every connection is at the cap (or the pool is empty) a new
    /// connection is created with the currently registered event handlers.
    ///
    /// Never fails: connections retain topics locally and declare them when
    /// a session is (re)established.
    pub async fn listen<P: TopicParams>(&self, name: &str, params: P) {
        self.listen_topic(build_topic(name, params)).await;
    }

    /// Subscribe to an already-canonical topic string.
    pub async fn listen_topic(&self, topic: impl Into<String>) {
        let topic = topic.into();
        let mut pool = self.pool.lock().await;

        for conn in pool.values() {
            if conn.has_topic(&topic).await {
                return;
            }
        }

        for conn in pool.values() {
            if !conn.is_closed() && conn.topics_count().await < MAX_TOPICS_PER_CONNECTION {
                conn.add_topic(topic).await;
                return;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handlers = self.handlers.read().unwrap().clone();
        log::debug!("[pubsub-link] creating connection {} for {}", id, topic);
        let conn = Connection::spawn(id, self.url.clone(), self.timeouts.clone(), handlers);
        conn.add_topic(topic).await;
        pool.insert(id, conn);
    }

    /// Unsubscribe from the topic built from `name` and `params`.
    ///
    /// Removes the topic from the (at most one) connection holding it. A
    /// connection left with zero topics is closed and evicted from the
    /// pool.
    pub async fn unlisten<P: TopicParams>(&self, name: &str, params: P) {
        self.unlisten_topic(&build_topic(name, params)).await;
    }

    /// Unsubscribe from an already-canonical topic string.
    pub async fn unlisten_topic(&self, topic: &str) {
        let mut pool = self.pool.lock().await;

        for conn in pool.values() {
            if conn.has_topic(topic).await {
                conn.remove_topic(topic).await;
                break;
            }
        }

        // By invariant at most one connection can be empty at a time.
        let mut empty_id = None;
        for (id, conn) in pool.iter() {
            if conn.topics_count().await == 0 {
                empty_id = Some(*id);
                break;
            }
        }
        if let Some(id) = empty_id {
            if let Some(conn) = pool.remove(&id) {
                log::debug!("[pubsub-link] evicting empty connection {}", id);
                conn.close().await;
            }
        }
    }

    /// Union of every connection's topic set.
    pub async fn topics(&self) -> Vec<String> {
        let pool = self.pool.lock().await;
        let mut all = Vec::new();
        for conn in pool.values() {
            all.extend(conn.topics().await);
        }
        all
    }

    /// Whether the topic built from `name` and `params` is subscribed
    /// anywhere in the pool.
    pub async fn has_topic<P: TopicParams>(&self, name: &str, params: P) -> bool {
        let topic = build_topic(name, params);
        let pool = self.pool.lock().await;
        for conn in pool.values() {
            if conn.has_topic(&topic).await {
                return true;
            }
        }
        false
    }

    /// Total number of subscribed topics across the pool.
    pub async fn topics_count(&self) -> usize {
        let pool = self.pool.lock().await;
        let mut count = 0;
        for conn in pool.values() {
            count += conn.topics_count().await;
        }
        count
    }

    /// Number of connections currently in the pool.
    pub async fn connection_count(&self) -> usize {
        self.pool.lock().await.len()
    }

    /// Close and evict every connection. Idempotent.
    pub async fn close(&self) {
        let mut pool = self.pool.lock().await;
        let connections = std::mem::take(&mut *pool);
        for (_, conn) in connections {
            conn.close().await;
        }
    }

    // ---------------------------------------------------------------
    // Event registration
    // ---------------------------------------------------------------
    //
    // Handlers registered here are copied onto each connection at its
    // creation. Known limitation, kept intentionally: connections that
    // already exist do NOT pick up handlers registered afterwards, so
    // register handlers before the first `listen`.

    /// Register the connect callback for future connections.
    pub fn on_connect(&self, f: impl Fn(ConnectionId) + Send + Sync + 'static) {
        self.handlers.write().unwrap().on_connect = Some(Arc::new(f));
    }

    /// Register the disconnect callback for future connections.
    pub fn on_disconnect(
        &self,
        f: impl Fn(ConnectionId, DisconnectReason) + Send + Sync + 'static,
    ) {
        self.handlers.write().unwrap().on_disconnect = Some(Arc::new(f));
    }

    /// Register the error callback for future connections.
    pub fn on_error(&self, f: impl Fn(ConnectionId, ConnectionError) + Send + Sync + 'static) {
        self.handlers.write().unwrap().on_error = Some(Arc::new(f));
    }

    /// Register the info callback for future connections.
    pub fn on_info(&self, f: impl Fn(ConnectionId, &str) + Send + Sync + 'static) {
        self.handlers.write().unwrap().on_info = Some(Arc::new(f));
    }

    /// Register the message callback for future connections.
    pub fn on_message(&self, f: impl Fn(ConnectionId, &Envelope) + Send + Sync + 'static) {
        self.handlers.write().unwrap().on_message = Some(Arc::new(f));
    }

    /// Register the ping callback for future connections.
    pub fn on_ping(&self, f: impl Fn(ConnectionId, Instant) + Send + Sync + 'static) {
        self.handlers.write().unwrap().on_ping = Some(Arc::new(f));
    }

    /// Register the pong callback for future connections.
    pub fn on_pong(&self, f: impl Fn(ConnectionId, Instant, Instant) + Send + Sync + 'static) {
        self.handlers.write().unwrap().on_pong = Some(Arc::new(f));
    }
}

/// Builder for a [`PubSub`] client.
#[derive(Debug)]
pub struct PubSubBuilder {
    url: String,
    timeouts: PubSubTimeouts,
    handlers: EventHandlers,
}

impl PubSubBuilder {
    /// Set the timeout configuration applied to every connection.
    pub fn timeouts(mut self, timeouts: PubSubTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the initial event handlers, applied to every connection created
    /// afterwards.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Validate the endpoint and build the client. No connection is dialed
    /// until the first `listen`.
    pub fn build(self) -> Result<PubSub> {
        let url = websocket::parse_endpoint(&self.url)?;
        Ok(PubSub {
            url,
            timeouts: self.timeouts,
            handlers: RwLock::new(self.handlers),
            next_id: AtomicU64::new(0),
            pool: Mutex::new(BTreeMap::new()),
        })
    }
}
