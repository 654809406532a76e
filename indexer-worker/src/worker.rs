use std::sync::Arc;
use std::time;

use tokio::time::sleep;
use tracing::{error, info, warn};

use indexer_common::health::HealthHandle;
use indexer_common::queue::{DeadLetterReason, Queue, QueueError, QueueMessage};
use indexer_common::retry::RetryPolicy;

use crate::dispatcher::{EventDispatcher, FailedMessage};
use crate::error::WorkerError;

/// A worker to poll a `Queue` and apply the talk events it receives to the search index.
pub struct IndexerWorker {
    /// An identifier for this worker, used in logs.
    name: String,
    /// The queue we will be receiving messages from.
    queue: Arc<dyn Queue>,
    dispatcher: EventDispatcher,
    /// The maximum number of messages to receive in one poll.
    max_messages_per_poll: u32,
    /// How long received messages stay hidden from other consumers.
    visibility_timeout: time::Duration,
    /// The interval for polling the queue when it is empty.
    poll_interval: time::Duration,
    /// Deliveries after which a failing message is dead-lettered instead of released.
    max_receive_count: u32,
    /// The retry policy used to compute redelivery delays of failed messages.
    retry_policy: RetryPolicy,
    /// The liveness check handle, to call on a schedule to report healthy
    liveness: HealthHandle,
}

impl IndexerWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        queue: Arc<dyn Queue>,
        dispatcher: EventDispatcher,
        max_messages_per_poll: u32,
        visibility_timeout: time::Duration,
        poll_interval: time::Duration,
        max_receive_count: u32,
        retry_policy: RetryPolicy,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            name: name.to_owned(),
            queue,
            dispatcher,
            max_messages_per_poll,
            visibility_timeout,
            poll_interval,
            max_receive_count,
            retry_policy,
            liveness,
        }
    }

    /// Run this worker to continuously process any messages that become available.
    pub async fn run(&self) {
        info!("worker {} polling for talk events", self.name);

        loop {
            self.liveness.report_healthy();

            match self.poll_once().await {
                Ok(0) => sleep(self.poll_interval).await,
                Ok(_) => continue,
                Err(error) => {
                    error!("error while polling for talk events: {}", error);
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Receive one batch, dispatch it and settle every message of it.
    /// Returns how many messages were received.
    pub async fn poll_once(&self) -> Result<usize, WorkerError> {
        let messages = self
            .queue
            .receive(self.max_messages_per_poll, self.visibility_timeout)
            .await?;

        let received = messages.len();
        metrics::histogram!("talk_events_receive_batch_size").record(received as f64);
        if received == 0 {
            return Ok(0);
        }

        let outcome = self.dispatcher.dispatch(messages).await;

        // Settle the whole batch even if the queue fails for some messages, so released
        // messages still get their backoff delay. The first queue error is reported.
        let mut first_error = None;

        for message in outcome.acknowledged {
            if let Err(error) = self.acknowledge(message).await {
                error!("failed to acknowledge message: {}", error);
                first_error.get_or_insert(error);
            }
        }

        for failed in outcome.failed {
            if let Err(error) = self.settle_failure(failed).await {
                error!("failed to settle message: {}", error);
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(received),
        }
    }

    async fn acknowledge(&self, message: QueueMessage) -> Result<(), WorkerError> {
        match self.queue.ack(message.receipt()).await {
            Ok(()) => {
                let latency = chrono::Utc::now() - message.created_at;
                metrics::histogram!("talk_events_enqueue_to_ack_duration_seconds")
                    .record(latency.num_milliseconds() as f64 / 1_000_f64);
                metrics::counter!("talk_events_acknowledged").increment(1);
                Ok(())
            }
            // Another consumer got the message after our visibility timeout ran out.
            Err(QueueError::ReceiptExpired(receipt)) => {
                warn!(
                    "message {} was redelivered before it could be acknowledged",
                    receipt.message_id
                );
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn settle_failure(&self, failed: FailedMessage) -> Result<(), WorkerError> {
        let FailedMessage { message, error } = failed;
        let receipt = message.receipt();
        let receive_count = u32::try_from(message.receive_count).unwrap_or(0);

        let result = if receive_count >= self.max_receive_count {
            error!(
                "dead-lettering message {} after {} deliveries: {}",
                message.id, receive_count, error
            );
            metrics::counter!("talk_events_dead_lettered", "kind" => error.kind()).increment(1);

            self.queue
                .dead_letter(
                    receipt,
                    DeadLetterReason {
                        kind: error.kind().to_owned(),
                        message: error.to_string(),
                    },
                )
                .await
        } else {
            let delay = self.retry_policy.redelivery_delay(receive_count);
            metrics::counter!("talk_events_released", "kind" => error.kind()).increment(1);

            self.queue.release(receipt, delay).await
        };

        match result {
            Ok(()) => Ok(()),
            Err(QueueError::ReceiptExpired(receipt)) => {
                warn!(
                    "message {} was redelivered before it could be settled",
                    receipt.message_id
                );
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;
    use url::Url;

    use indexer_common::config::NonEmptyString;
    use indexer_common::health::HealthRegistry;
    use indexer_common::memqueue::MemoryQueue;
    use async_trait::async_trait;
    use indexer_common::queue::{NewMessage, QueueResult, Receipt};

    use super::*;
    use crate::config::{IndexConfig, SourceConfig};
    use crate::index::IndexWriter;
    use crate::projector::TalkProjector;

    fn worker(
        queue: &MemoryQueue,
        source: &MockServer,
        search: &MockServer,
        max_receive_count: u32,
    ) -> IndexerWorker {
        let projector = TalkProjector::new(
            SourceConfig {
                base_url: Url::parse(&source.base_url()).unwrap(),
                username: None,
                password: None,
            },
            Duration::from_secs(1),
        )
        .unwrap();
        let writer = IndexWriter::new(
            IndexConfig {
                base_url: Url::parse(&search.base_url()).unwrap(),
                index: NonEmptyString("talks".to_owned()),
                username: None,
                password: None,
            },
            Duration::from_secs(1),
        )
        .unwrap();
        let registry = HealthRegistry::new("liveness");
        let liveness = registry.register("worker".to_string(), ::time::Duration::seconds(30));

        IndexerWorker::new(
            "test-worker",
            Arc::new(queue.clone()),
            EventDispatcher::new(projector, writer, 2),
            10,
            Duration::from_secs(30),
            Duration::from_millis(10),
            max_receive_count,
            RetryPolicy::build(2, Duration::from_secs(60)).provide(),
            liveness,
        )
    }

    /// A `MemoryQueue` whose acks always fail, recording which receipts were released.
    #[derive(Clone, Default)]
    struct FailingAckQueue {
        inner: MemoryQueue,
        released: Arc<std::sync::Mutex<Vec<Receipt>>>,
    }

    #[async_trait]
    impl Queue for FailingAckQueue {
        async fn enqueue(&self, message: NewMessage) -> QueueResult<()> {
            self.inner.enqueue(message).await
        }

        async fn receive(
            &self,
            max_messages: u32,
            visibility_timeout: time::Duration,
        ) -> QueueResult<Vec<QueueMessage>> {
            self.inner.receive(max_messages, visibility_timeout).await
        }

        async fn ack(&self, _receipt: Receipt) -> QueueResult<()> {
            Err(QueueError::QueueFull { capacity: 0 })
        }

        async fn release(&self, receipt: Receipt, delay: time::Duration) -> QueueResult<()> {
            self.released.lock().unwrap().push(receipt);
            self.inner.release(receipt, delay).await
        }

        async fn dead_letter(&self, receipt: Receipt, reason: DeadLetterReason) -> QueueResult<()> {
            self.inner.dead_letter(receipt, reason).await
        }
    }

    async fn enqueue_event(queue: &MemoryQueue, event_type: &str, talk_id: &str) {
        let body = json!({
            "eventId": "e1",
            "eventType": event_type,
            "entityId": talk_id,
            "conferenceId": "c1"
        });
        queue
            .enqueue(NewMessage::new(serde_json::to_vec(&body).unwrap()))
            .await
            .expect("failed to enqueue");
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let source = MockServer::start_async().await;
        let search = MockServer::start_async().await;
        let queue = MemoryQueue::new();

        let received = worker(&queue, &source, &search, 5).poll_once().await.unwrap();

        assert_eq!(received, 0);
    }

    #[tokio::test]
    async fn test_processed_messages_are_acknowledged() {
        let source = MockServer::start_async().await;
        let search = MockServer::start_async().await;
        source
            .mock_async(|when, then| {
                when.method(GET).path("/data/session/t1");
                then.status(200).json_body(json!({"id": "t1", "status": "PUBLISHED"}));
            })
            .await;
        let upsert = search
            .mock_async(|when, then| {
                when.method(PUT).path("/talks/_doc/t1");
                then.status(200);
            })
            .await;

        let queue = MemoryQueue::new();
        enqueue_event(&queue, "talk.updated", "t1").await;
        enqueue_event(&queue, "talk.renamed", "t1").await;

        let received = worker(&queue, &source, &search, 5).poll_once().await.unwrap();

        assert_eq!(received, 2);
        assert!(queue.messages().await.is_empty());
        upsert.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_failed_message_is_released_for_later() {
        let source = MockServer::start_async().await;
        let search = MockServer::start_async().await;
        source
            .mock_async(|when, then| {
                when.method(GET).path("/data/session/t1");
                then.status(503);
            })
            .await;

        let queue = MemoryQueue::new();
        enqueue_event(&queue, "talk.published", "t1").await;

        let worker = worker(&queue, &source, &search, 5);
        assert_eq!(worker.poll_once().await.unwrap(), 1);

        let messages = queue.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].receive_count, 1);
        assert!(queue.dead_letters().await.is_empty());

        // Released with a backoff delay, so it is not handed out again right away.
        assert_eq!(worker.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ack_error_does_not_stop_settling_the_batch() {
        let source = MockServer::start_async().await;
        let search = MockServer::start_async().await;
        source
            .mock_async(|when, then| {
                when.method(GET).path("/data/session/good");
                then.status(200).json_body(json!({"id": "good"}));
            })
            .await;
        source
            .mock_async(|when, then| {
                when.method(GET).path("/data/session/bad");
                then.status(503);
            })
            .await;
        search
            .mock_async(|when, then| {
                when.method(PUT).path("/talks/_doc/good");
                then.status(200);
            })
            .await;

        let queue = FailingAckQueue::default();
        enqueue_event(&queue.inner, "talk.updated", "good").await;
        enqueue_event(&queue.inner, "talk.updated", "bad").await;

        let mut worker = worker(&queue.inner, &source, &search, 5);
        worker.queue = Arc::new(queue.clone());

        let result = worker.poll_once().await;

        assert!(matches!(
            result,
            Err(WorkerError::QueueError(QueueError::QueueFull { .. }))
        ));
        let released = queue.released.lock().unwrap().clone();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].message_id, 2);
    }

    #[tokio::test]
    async fn test_exhausted_message_is_dead_lettered() {
        let source = MockServer::start_async().await;
        let search = MockServer::start_async().await;
        source
            .mock_async(|when, then| {
                when.method(GET).path("/data/session/t1");
                then.status(500);
            })
            .await;

        let queue = MemoryQueue::new();
        enqueue_event(&queue, "talk.created", "t1").await;

        worker(&queue, &source, &search, 1)
            .poll_once()
            .await
            .unwrap();

        assert!(queue.messages().await.is_empty());
        let dead_letters = queue.dead_letters().await;
        assert_eq!(dead_letters.len(), 1);
        assert_eq!(dead_letters[0].1.kind, "fetch");
    }

    #[tokio::test]
    async fn test_malformed_message_is_not_retried() {
        let source = MockServer::start_async().await;
        let search = MockServer::start_async().await;

        let queue = MemoryQueue::new();
        queue
            .enqueue(NewMessage::new("{\"eventType\": 1"))
            .await
            .unwrap();

        worker(&queue, &source, &search, 5)
            .poll_once()
            .await
            .unwrap();

        assert!(queue.messages().await.is_empty());
        assert!(queue.dead_letters().await.is_empty());
    }
}
