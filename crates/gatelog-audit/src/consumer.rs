use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use gatelog_queue::{Delivery, QueueError, Subscription};
use gatelog_types::Generation;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ConsumerConfig;
use crate::error::AuditResult;
use crate::line::LogLine;
use crate::writer::AppendLog;

/// What happened to one delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The line is in the log and the delivery was acknowledged.
    Acked { generation: Generation, attempts: u32 },
    /// The append failed; the delivery was returned for redelivery.
    Nacked { error: String },
}

impl Disposition {
    pub fn is_acked(&self) -> bool {
        matches!(self, Self::Acked { .. })
    }
}

/// Running counters for a consumer.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub acked: u64,
    pub nacked: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
        }
    }
}

/// Pulls audit events, appends one line per event, then acks or nacks.
///
/// A delivery is acknowledged only after its line is committed. Any append
/// failure withholds the ack so the queue redelivers the message later.
#[derive(Clone)]
pub struct Consumer {
    subscription: Arc<dyn Subscription>,
    writer: AppendLog,
    config: ConsumerConfig,
    stats: Arc<ConsumerStats>,
}

impl Consumer {
    pub fn new(subscription: Arc<dyn Subscription>, writer: AppendLog, config: ConsumerConfig) -> Self {
        Self {
            subscription,
            writer,
            config,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Translate, append, and settle a single delivery.
    pub async fn process(&self, delivery: Delivery) -> Disposition {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let line = LogLine::from_event(&delivery.message_id, &delivery.data, Utc::now());
        if line.is_raw() {
            warn!(message_id = %delivery.message_id, "event payload is not a JSON object");
        }

        match self.writer.append(&self.config.log_object, &line.to_string()).await {
            Ok(receipt) => {
                if let Err(e) = self.subscription.ack(&delivery.ack_id).await {
                    // The line is already in the log; redelivery will add a duplicate.
                    warn!(message_id = %delivery.message_id, error = %e, "ack failed");
                }
                self.stats.acked.fetch_add(1, Ordering::Relaxed);
                info!(
                    message_id = %delivery.message_id,
                    generation = %receipt.generation,
                    attempts = receipt.attempts,
                    "event appended and acked"
                );
                Disposition::Acked {
                    generation: receipt.generation,
                    attempts: receipt.attempts,
                }
            }
            Err(e) => {
                error!(
                    message_id = %delivery.message_id,
                    delivery_attempt = delivery.delivery_attempt,
                    error = %e,
                    "append failed, withholding ack"
                );
                if let Err(nack_err) = self.subscription.nack(&delivery.ack_id).await {
                    warn!(message_id = %delivery.message_id, error = %nack_err, "nack failed");
                }
                self.stats.nacked.fetch_add(1, Ordering::Relaxed);
                Disposition::Nacked {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Process a batch concurrently and wait for every delivery to settle.
    pub async fn dispatch(&self, batch: Vec<Delivery>) -> Vec<Disposition> {
        let mut tasks = JoinSet::new();
        for delivery in batch {
            let consumer = self.clone();
            tasks.spawn(async move { consumer.process(delivery).await });
        }

        let mut settled = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(disposition) => settled.push(disposition),
                Err(e) => error!(error = %e, "delivery task failed"),
            }
        }
        settled
    }

    /// One pull followed by processing of whatever it returned.
    pub async fn poll_once(&self) -> AuditResult<Vec<Disposition>> {
        let batch = self.subscription.pull(self.config.max_messages).await?;
        Ok(self.dispatch(batch).await)
    }

    /// Consume until `shutdown` flips to `true` or the subscription closes.
    ///
    /// Shutdown interrupts pulls and idle waits only. A batch that has
    /// been pulled is always processed to the end.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AuditResult<()> {
        info!(
            log_object = %self.config.log_object,
            bucket = self.writer.store().bucket(),
            "audit consumer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pulled = tokio::select! {
                _ = shutdown.changed() => break,
                pulled = self.subscription.pull(self.config.max_messages) => pulled,
            };

            match pulled {
                Ok(batch) if !batch.is_empty() => {
                    self.dispatch(batch).await;
                    continue;
                }
                Ok(_) => {}
                Err(QueueError::Closed) => {
                    info!("subscription closed");
                    break;
                }
                Err(e) => error!(error = %e, "pull failed"),
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        let stats = self.stats.snapshot();
        info!(
            received = stats.received,
            acked = stats.acked,
            nacked = stats.nacked,
            "audit consumer stopped"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("writer", &self.writer)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use gatelog_queue::{Attributes, InMemoryQueue, Publisher};
    use gatelog_store::{
        InMemoryObjectStore, ObjectStore, Precondition, StoreError, StoreResult, StoredObject,
        WriteOutcome,
    };

    use crate::config::RetryPolicy;

    /// Never lets a conditional write through.
    struct Contended;

    #[async_trait]
    impl ObjectStore for Contended {
        fn bucket(&self) -> &str {
            "contended"
        }
        async fn read(&self, _name: &str) -> StoreResult<Option<StoredObject>> {
            Ok(None)
        }
        async fn exists(&self, _name: &str) -> StoreResult<bool> {
            Ok(false)
        }
        async fn write_if(&self, _: &str, _: Bytes, _: Precondition) -> StoreResult<WriteOutcome> {
            Ok(WriteOutcome::Conflict)
        }
        async fn put(&self, _: &str, _: Bytes) -> StoreResult<Generation> {
            Ok(Generation::first())
        }
    }

    /// Commits the first write but reports it as failed.
    struct LostResponse {
        inner: InMemoryObjectStore,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl ObjectStore for LostResponse {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }
        async fn read(&self, name: &str) -> StoreResult<Option<StoredObject>> {
            self.inner.read(name).await
        }
        async fn exists(&self, name: &str) -> StoreResult<bool> {
            self.inner.exists(name).await
        }
        async fn write_if(&self, name: &str, data: Bytes, p: Precondition) -> StoreResult<WriteOutcome> {
            let outcome = self.inner.write_if(name, data, p).await?;
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Http {
                    status: 503,
                    name: name.into(),
                    message: "connection reset".into(),
                });
            }
            Ok(outcome)
        }
        async fn put(&self, name: &str, data: Bytes) -> StoreResult<Generation> {
            self.inner.put(name, data).await
        }
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig {
            poll_interval_ms: 10,
            retry: RetryPolicy::immediate(5),
            ..ConsumerConfig::default()
        }
    }

    fn consumer(queue: &Arc<InMemoryQueue>, store: Arc<dyn ObjectStore>) -> Consumer {
        let config = config();
        let writer = AppendLog::new(store, config.retry.clone());
        Consumer::new(queue.clone(), writer, config)
    }

    async fn log_lines(store: &dyn ObjectStore) -> Vec<LogLine> {
        let Some(obj) = store.read("audit/access.log").await.unwrap() else {
            return Vec::new();
        };
        String::from_utf8(obj.data.to_vec())
            .unwrap()
            .lines()
            .map(|l| LogLine::parse(l).unwrap())
            .collect()
    }

    async fn publish(queue: &InMemoryQueue, payload: &str) -> String {
        queue
            .publish(Bytes::from(payload.to_string()), Attributes::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn appended_event_is_acked() {
        let queue = Arc::new(InMemoryQueue::recording());
        let store = Arc::new(InMemoryObjectStore::new("b"));
        let id = publish(
            &queue,
            r#"{"event_type":"file_served","path":"/a.txt","country":"Norway"}"#,
        )
        .await;

        let settled = consumer(&queue, store.clone()).poll_once().await.unwrap();
        assert_eq!(settled.len(), 1);
        assert!(settled[0].is_acked());
        assert_eq!(queue.acked_ids(), vec![id.clone()]);
        assert_eq!(queue.outstanding_len(), 0);

        let lines = log_lines(store.as_ref()).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message_id, id);
        assert_eq!(lines[0].country, "Norway");
        assert_eq!(lines[0].path, "/a.txt");
        assert_eq!(lines[0].event_type, "file_served");
    }

    #[tokio::test]
    async fn malformed_payload_still_yields_one_line() {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryObjectStore::new("b"));
        publish(&queue, "not json at all").await;

        let c = consumer(&queue, store.clone());
        assert!(c.poll_once().await.unwrap()[0].is_acked());

        let lines = log_lines(store.as_ref()).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].country, "");
        assert_eq!(lines[0].raw.as_deref(), Some("not json at all"));
    }

    #[tokio::test]
    async fn exhausted_append_is_nacked_and_redelivered() {
        let queue = Arc::new(InMemoryQueue::new());
        publish(&queue, r#"{"event_type":"x"}"#).await;

        let c = consumer(&queue, Arc::new(Contended));
        let settled = c.poll_once().await.unwrap();
        assert!(matches!(settled[0], Disposition::Nacked { .. }));
        assert_eq!(queue.acked_count(), 0);
        assert_eq!(queue.pending_len(), 1);

        let again = queue.pull(10).await.unwrap();
        assert_eq!(again[0].delivery_attempt, 2);
        assert_eq!(c.stats(), StatsSnapshot { received: 1, acked: 0, nacked: 1 });
    }

    #[tokio::test]
    async fn lost_write_response_leads_to_tolerated_duplicate() {
        let queue = Arc::new(InMemoryQueue::recording());
        let store = Arc::new(LostResponse {
            inner: InMemoryObjectStore::new("b"),
            tripped: AtomicBool::new(false),
        });
        let id = publish(&queue, r#"{"event_type":"file_served"}"#).await;

        let c = consumer(&queue, store.clone());
        assert!(!c.poll_once().await.unwrap()[0].is_acked());
        assert!(c.poll_once().await.unwrap()[0].is_acked());

        let lines = log_lines(&store.inner).await;
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.message_id == id));
        assert_eq!(queue.acked_ids(), vec![id]);
    }

    #[tokio::test]
    async fn empty_pull_settles_nothing() {
        let queue = Arc::new(InMemoryQueue::new());
        let c = consumer(&queue, Arc::new(InMemoryObjectStore::new("b")));
        assert!(c.poll_once().await.unwrap().is_empty());
        assert_eq!(c.stats(), StatsSnapshot::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_drains_queue_and_stops_on_shutdown() {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryObjectStore::new("b"));
        for i in 0..25 {
            publish(&queue, &format!(r#"{{"event_type":"e{i}"}}"#)).await;
        }

        let c = consumer(&queue, store.clone());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn({
            let c = c.clone();
            async move { c.run(rx).await }
        });

        tokio::time::timeout(Duration::from_secs(10), async {
            while queue.acked_count() < 25 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue drained");

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("consumer stopped")
            .unwrap()
            .unwrap();

        assert_eq!(log_lines(store.as_ref()).await.len(), 25);
        assert_eq!(c.stats().acked, 25);
    }

    #[tokio::test]
    async fn run_ends_when_subscription_closes() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.close();
        let c = consumer(&queue, Arc::new(InMemoryObjectStore::new("b")));
        let (_tx, rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(5), c.run(rx))
            .await
            .expect("run returned")
            .unwrap();
    }
}
