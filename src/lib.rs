//! Client library for a WebSocket publish/subscribe edge service.
//!
//! The service pushes asynchronous messages for subscribed topics over
//! persistent WebSocket connections, each capped at
//! [`MAX_TOPICS_PER_CONNECTION`] topics. This crate keeps those channels
//! alive indefinitely and takes care of the protocol's bookkeeping
//! automatically:
//!
//! - **Sharding**: [`PubSub`] spreads any number of topics across a pool of
//!   connections, creating one only when every existing connection is at
//!   the cap and closing any that drains to zero topics.
//! - **Reconnection**: a dropped session is redialed forever with a bounded
//!   pause, and the full topic set is re-declared after every connect.
//! - **Keepalive**: periodic PING/PONG probes detect silently dead
//!   connections and trigger the same recovery path.
//!
//! Lifecycle and message events are surfaced through [`EventHandlers`]
//! callbacks; failures never abort the client.
//!
//! # Example
//!
//! ```rust,no_run
//! use pubsub_link::{EventHandlers, PubSub};
//!
//! # async fn example() -> pubsub_link::Result<()> {
//! let pubsub = PubSub::builder("wss://pubsub.example.com")
//!     .event_handlers(
//!         EventHandlers::new()
//!             .on_connect(|id| println!("connection {} is up", id))
//!             .on_message(|_id, envelope| println!("push: {:?}", envelope.message())),
//!     )
//!     .build()?;
//!
//! pubsub.listen("channel-points", (42,)).await;
//! pubsub.listen("chat-moderation", (42, "mods")).await;
//!
//! // ... messages arrive through the on_message callback ...
//!
//! pubsub.close().await;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod pubsub;
pub mod timeouts;
pub mod topic;

pub use connection::{Connection, ConnectionBuilder, ConnectionId, MAX_TOPICS_PER_CONNECTION};
pub use error::{PubSubError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{Envelope, EnvelopeType, MessageData, TopicsData};
pub use pubsub::{PubSub, PubSubBuilder};
pub use timeouts::{PubSubTimeouts, PubSubTimeoutsBuilder};
pub use topic::{build_topic, TopicParams};
