use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::traits::{Attributes, Delivery, Publisher, Subscription};

#[derive(Clone, Debug)]
struct Message {
    id: String,
    data: Bytes,
    attributes: Attributes,
    attempts: u32,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Message>,
    outstanding: HashMap<String, Message>,
    acked: u64,
    ack_log: Option<Vec<String>>,
    next_ack: u64,
    closed: bool,
}

/// Single-process queue with at-least-once delivery.
///
/// Published messages wait in a FIFO. `pull` moves them to an outstanding
/// set under a fresh ack id; `ack` retires them, `nack` puts them back at
/// the end of the FIFO. [`expire_outstanding`](Self::expire_outstanding)
/// simulates ack deadlines lapsing after a consumer crash.
///
/// Acked messages are dropped and only counted. A queue built with
/// [`recording`](Self::recording) also keeps their ids for inspection.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<State>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that remembers the id of every acked message.
    pub fn recording() -> Self {
        let queue = Self::default();
        queue.state.lock().expect("lock poisoned").ack_log = Some(Vec::new());
        queue
    }

    /// Messages waiting to be pulled.
    pub fn pending_len(&self) -> usize {
        self.state.lock().expect("lock poisoned").pending.len()
    }

    /// Deliveries pulled but neither acked nor nacked.
    pub fn outstanding_len(&self) -> usize {
        self.state.lock().expect("lock poisoned").outstanding.len()
    }

    /// Number of successful acks so far.
    pub fn acked_count(&self) -> u64 {
        self.state.lock().expect("lock poisoned").acked
    }

    /// Message ids in acknowledgement order, empty unless the queue is
    /// [`recording`](Self::recording). A redelivered message that is acked
    /// twice appears twice.
    pub fn acked_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("lock poisoned")
            .ack_log
            .clone()
            .unwrap_or_default()
    }

    /// Return every outstanding delivery to the FIFO, as if its ack
    /// deadline had passed. Returns how many were requeued.
    pub fn expire_outstanding(&self) -> usize {
        let mut state = self.state.lock().expect("lock poisoned");
        let mut expired: Vec<(String, Message)> = state.outstanding.drain().collect();
        expired.sort_by(|a, b| a.0.cmp(&b.0));
        let count = expired.len();
        state.pending.extend(expired.into_iter().map(|(_, msg)| msg));
        count
    }

    /// Stop accepting publishes and pulls.
    pub fn close(&self) {
        self.state.lock().expect("lock poisoned").closed = true;
    }
}

#[async_trait]
impl Subscription for InMemoryQueue {
    async fn pull(&self, max_messages: usize) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.closed {
            return Err(QueueError::Closed);
        }
        let mut batch = Vec::new();
        while batch.len() < max_messages {
            let Some(mut msg) = state.pending.pop_front() else {
                break;
            };
            msg.attempts += 1;
            state.next_ack += 1;
            let ack_id = format!("ack-{:08}", state.next_ack);
            batch.push(Delivery {
                message_id: msg.id.clone(),
                ack_id: ack_id.clone(),
                data: msg.data.clone(),
                attributes: msg.attributes.clone(),
                delivery_attempt: msg.attempts,
            });
            state.outstanding.insert(ack_id, msg);
        }
        Ok(batch)
    }

    async fn ack(&self, ack_id: &str) -> QueueResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        let msg = state
            .outstanding
            .remove(ack_id)
            .ok_or_else(|| QueueError::UnknownAckId(ack_id.to_string()))?;
        state.acked += 1;
        if let Some(log) = state.ack_log.as_mut() {
            log.push(msg.id);
        }
        Ok(())
    }

    async fn nack(&self, ack_id: &str) -> QueueResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        let msg = state
            .outstanding
            .remove(ack_id)
            .ok_or_else(|| QueueError::UnknownAckId(ack_id.to_string()))?;
        debug!(message_id = %msg.id, attempts = msg.attempts, "message requeued");
        state.pending.push_back(msg);
        Ok(())
    }
}

#[async_trait]
impl Publisher for InMemoryQueue {
    async fn publish(&self, data: Bytes, attributes: Attributes) -> QueueResult<String> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.closed {
            return Err(QueueError::Closed);
        }
        let id = uuid::Uuid::now_v7().to_string();
        state.pending.push_back(Message {
            id: id.clone(),
            data,
            attributes,
            attempts: 0,
        });
        Ok(id)
    }
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("pending", &self.pending_len())
            .field("outstanding", &self.outstanding_len())
            .finish()
    }
}
