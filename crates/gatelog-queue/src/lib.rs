//! Event delivery for gatelog.
//!
//! Models a pull-based, acknowledging message queue with at-least-once
//! semantics: a delivered message stays eligible for redelivery until it is
//! acknowledged, a negative acknowledgement makes it eligible again, and
//! nothing is deduplicated or ordered.
//!
//! # Backends
//!
//! - [`InMemoryQueue`] -- single-process queue implementing both [`Subscription`] and [`Publisher`]
//! - [`PubSubSubscription`] / [`PubSubPublisher`] -- Google Cloud Pub/Sub REST API

pub mod error;
pub mod memory;
pub mod pubsub;
pub mod traits;

pub use error::{QueueError, QueueResult};
pub use memory::InMemoryQueue;
pub use pubsub::{PubSubConfig, PubSubPublisher, PubSubSubscription};
pub use traits::{Attributes, Delivery, Publisher, Subscription};
