use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::QueueResult;

/// String key/value metadata attached to a message.
pub type Attributes = BTreeMap<String, String>;

/// One delivery attempt of one message.
///
/// The same message may be delivered more than once; each delivery has its
/// own `ack_id`, while `message_id` stays the same across redeliveries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub ack_id: String,
    pub data: Bytes,
    pub attributes: Attributes,
    /// 1 on first delivery, incremented on each redelivery.
    pub delivery_attempt: u32,
}

/// Pull side of a queue.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Pull up to `max_messages` deliveries. May return an empty batch.
    async fn pull(&self, max_messages: usize) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a delivery: its message is never redelivered.
    async fn ack(&self, ack_id: &str) -> QueueResult<()>;

    /// Negatively acknowledge a delivery: its message becomes eligible for
    /// redelivery at a time of the queue's choosing.
    async fn nack(&self, ack_id: &str) -> QueueResult<()>;
}

/// Publish side of a queue.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message and return its message id.
    async fn publish(&self, data: Bytes, attributes: Attributes) -> QueueResult<String>;
}
