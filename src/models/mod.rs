//! Wire data models for the pubsub-link client.
//!
//! Defines the protocol envelope exchanged with the pub/sub service and the
//! typed payload shapes carried in its `data` field.

pub mod envelope;
pub mod message_data;
pub mod topics_data;


pub use envelope::{Envelope, EnvelopeType};
pub use message_data::MessageData;
pub use topics_data::TopicsData;
